pub mod collect;
pub mod lang;
pub mod packages;
pub mod records;
pub mod scanner;

pub use collect::{collect_files, relative_key, CollectConfig};
pub use packages::{detect_managers, scan_packages};
pub use records::*;
pub use scanner::{scan_code, ScanConfig};
