mod action_result;
mod backup_properties;
mod contents;
mod progress;

pub use action_result::ActionResult;
pub use backup_properties::BackupProperties;
pub use contents::{ContentsEntry, ContentsManifest};
pub use progress::{TaskProgress, TaskStatus};
