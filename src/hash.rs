use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::data::JoinKey;

pub fn stable_hash_with(f: impl FnOnce(&mut DefaultHasher)) -> u64 {
    let mut hasher = DefaultHasher::new();
    f(&mut hasher);
    hasher.finish()
}

/// Hash of a join key; equal keys always land on the same shard.
pub fn stable_hash_key(seed: u64, key: &JoinKey) -> u64 {
    stable_hash_with(|hasher| {
        seed.hash(hasher);
        key.date.hash(hasher);
        key.ip.hash(hasher);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn key_hash_depends_on_date_and_ip() {
        let date = NaiveDate::from_ymd_opt(2021, 5, 1).unwrap();
        let a = JoinKey::new(date, "1.1.1.1");
        let b = JoinKey::new(date, "1.1.1.1");
        let c = JoinKey::new(date.succ_opt().unwrap(), "1.1.1.1");
        assert_eq!(stable_hash_key(7, &a), stable_hash_key(7, &b));
        assert_ne!(stable_hash_key(7, &a), stable_hash_key(7, &c));
    }
}
