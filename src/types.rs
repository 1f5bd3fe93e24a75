/// Batch identifier derived from the directory holding a data file.
/// Example: `CP_Quack-echo-2020-08-23-06-01-02`
pub type SourceId = String;
/// Object path strings as returned by a listing.
/// Example: `data/echo/CP_Quack-echo-2020-08-23-06-01-02/results.json.gz`
pub type PathString = String;
/// Textual IPv4 or IPv6 address.
/// Examples: `1.2.3.4`, `2001:db8::1`
pub type IpString = String;
/// Random 128-bit hex identifier shared by every row of one raw line.
/// Example: `3e1f0c1b9d6a4f5e8a7b6c5d4e3f2a1b`
pub type MeasurementId = String;
/// Queried or tested domain name.
/// Examples: `example.com`, `www.example.com`
pub type Domain = String;
/// Two-letter country code attached by metadata providers.
/// Examples: `US`, `DE`
pub type CountryCode = String;
/// `<stage>/<result>` round-trip classification.
/// Examples: `expected/match`, `dial/tcp.refused`, `content/status_mismatch:404`
pub type Outcome = String;
/// Relative output path chosen by the partition planner.
/// Example: `echo/source=CP_Quack-echo-2020-08-23-06-01-02/country=US/results.json.gz`
pub type PartitionPath = String;
