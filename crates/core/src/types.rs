/// Identifier of one launched job instance.
///
/// This is the unique suffix of the instance's workspace directory name, so
/// the same string locates the workspace, the console artifact, and the
/// instance's run log lines.
pub type InstanceId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
