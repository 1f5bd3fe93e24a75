/// Constants used when selecting source files for a run.
pub mod selection {
    /// Size in bytes of a gzip stream that contains no data.
    ///
    /// Files at or below this size are skipped during selection.
    pub const EMPTY_GZIPPED_FILE_SIZE: u64 = 33;
    /// Compression suffix stripped before matching data filenames.
    pub const GZIP_SUFFIX: &str = ".gz";
    /// Data filenames written by probe-style scanners (echo, discard, http, https).
    pub const PROBE_DATA_FILES: &[&str] = &["results.json"];
    /// Data filenames written by the resolution-style scanner.
    ///
    /// Includes the resolver and answer tag files merged onto resolution rows.
    pub const RESOLUTION_DATA_FILES: &[&str] = &[
        "results.json",
        "interference.json",
        "answers_control.json",
        "resolvers.json",
        "tagged_resolvers.json",
        "tagged_answers.json",
    ];
    /// Debug message for listed paths that carry no date stamp.
    pub const SKIP_UNDATED_MSG: &str = "skipping path without a date stamp";
    /// Info message emitted when selection finds nothing new to ingest.
    pub const NO_NEW_FILES_MSG: &str = "No new files to load";
}

/// Constants used by the measurement flattener.
pub mod flatten {
    /// Path component that routes a file to the resolution extractor.
    pub const RESOLUTION_PATH_COMPONENT: &str = "Satellite";
    /// Test domains scanners use as controls.
    pub const CONTROL_URLS: &[&str] = &[
        "example5718349450314.com",
        "rtyutgyhefdafioasfjhjhi.com",
        "a.root-servers.net",
        "www.example.com",
    ];
    /// AS name prefixes of content delivery networks.
    ///
    /// Anomalous resolutions that land on these networks are excluded as false positives.
    pub const CDN_AS_PREFIXES: &[&str] = &["AMAZON", "Akamai", "OPENDNS", "CLOUDFLARENET", "GOOGLE"];
    /// Exclusion reason recorded for answers served by a CDN.
    pub const CDN_EXCLUDE_REASON: &str = "is_CDN";
    /// Answer tags that count towards resolution confidence.
    pub const ANSWER_TAGS: &[&str] = &["http", "asnum", "asname", "cert"];
    /// Tag meaning the answer IP itself appeared in the control response.
    pub const IP_TAG: &str = "ip";
    /// Warning emitted for lines that are not valid JSON.
    pub const MALFORMED_LINE_MSG: &str = "skipping malformed measurement line";
    /// Warning emitted for JSON records of no known shape.
    pub const UNKNOWN_SHAPE_MSG: &str = "skipping measurement of unknown shape";
    /// Files describing resolvers (name and location) by IP.
    pub const RESOLVER_TAG_FILES: &[&str] = &["resolvers.json", "tagged_resolvers.json"];
    /// Files describing answer IPs (http, cert and AS tags) by IP.
    pub const ANSWER_TAG_FILES: &[&str] = &["tagged_answers.json"];
    /// Warning emitted for tag lines that cannot be used.
    pub const SKIP_TAG_LINE_MSG: &str = "skipping unreadable tag line";
}

/// Constants used by hyperquack outcome classification.
pub mod outcome {
    /// Outcome for a round trip that matched its template.
    pub const EXPECTED_MATCH: &str = "expected/match";
    /// Outcome for responses served by a trusted Akamai edge.
    pub const TRUSTED_AKAMAI: &str = "expected/trusted_host:akamai";
    /// Outcome for a content mismatch without a recorded error.
    pub const CONTENT_MISMATCH: &str = "content/mismatch";
    /// Prefix for status-line mismatches (status code appended when known).
    pub const STATUS_MISMATCH: &str = "content/status_mismatch";
    /// Fallback outcome for unrecognised errors.
    pub const UNKNOWN: &str = "unknown/unknown";
    /// `Server` headers that identify Akamai edges.
    pub const AKAMAI_SERVER_HEADERS: &[&str] = &["Server: AkamaiGHost", "Server: GHost"];
}

/// Constants used by the metadata join.
pub mod join {
    /// Default number of shards rows are routed to before merging.
    pub const DEFAULT_PARTITIONS: usize = 8;
    /// Seed mixed into join-key routing hashes.
    pub const SHARD_SEED: u64 = 0x5CA7_7AB1;
}

/// Constants used by metadata providers.
pub mod provider {
    /// Extension of netblock snapshot files under a metadata root.
    pub const SNAPSHOT_EXTENSION: &str = "jsonl";
    /// Debug message for IPs that no netblock covers.
    pub const LOOKUP_MISS_MSG: &str = "no metadata for ip";
    /// Warning emitted for unparseable snapshot lines.
    pub const SKIP_SNAPSHOT_LINE_MSG: &str = "skipping unreadable snapshot line";
}

/// Constants used by output partitioning and sinks.
pub mod output {
    /// Partition value written when a row has no country.
    pub const UNSET_PARTITION_VALUE: &str = "__HIVE_DEFAULT_PARTITION__";
    /// File name of every partition file in a file-tree export.
    pub const PARTITION_FILE_NAME: &str = "results.json.gz";
    /// Path component key for the source partition.
    pub const SOURCE_PARTITION_KEY: &str = "source";
    /// Path component key for the country partition.
    pub const COUNTRY_PARTITION_KEY: &str = "country";
    /// Separator between a partition key and its value.
    pub const PARTITION_DELIMITER: &str = "=";
    /// Scheme prefix of file-tree destinations.
    pub const FILE_TREE_SCHEME: &str = "file://";
    /// Default dataset name for table destinations.
    pub const DEFAULT_DATASET: &str = "base";
    /// Base name appended to the scan family to form a table name.
    pub const BASE_TABLE_NAME: &str = "scan";
    /// Extension of table part files.
    pub const TABLE_PART_EXTENSION: &str = "json.gz";
    /// Prefix of table part files.
    pub const TABLE_PART_PREFIX: &str = "part-";
    /// Prefix of the staging directory a commit writes into.
    pub const STAGING_PREFIX: &str = ".staging-";
    /// Directory inside staging that receives data a commit displaces.
    pub const DISPLACED_DIR: &str = ".previous";
    /// Directory inside staging holding a table's new contents.
    pub const STAGED_TABLE_DIR: &str = "table";
}
