/// Directory created under the work directory when no storage roots are configured.
pub const DEFAULT_ROOT_DIR_NAME: &str = "filestorage";

/// Separates the physical path of a reference from the encoded original filename.
pub const REFERENCE_SEPARATOR: char = '*';

/// Logical storage name used when none is configured.
pub const DEFAULT_STORAGE_NAME: &str = "fs";

pub const DEFAULT_REPLICATION_WORKERS: usize = 5;

pub const DEFAULT_REPLICATION_QUEUE_CAPACITY: usize = 1024;
