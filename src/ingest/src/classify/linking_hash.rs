use sha2::{Digest, Sha256};

/// The fields that identify one JVM process across snapshots.
#[derive(Debug, Clone, Copy)]
pub struct IdentityFields<'a> {
    pub hostname: &'a str,
    pub launch_time: i64,
    pub vendor: Option<&'a str>,
    pub version_string: Option<&'a str>,
    pub java_home: Option<&'a str>,
    pub pid: Option<i64>,
}

/// Hex SHA-256 over the identity fields, NUL separated, absent fields as empty strings.
pub fn compute_linking_hash(fields: &IdentityFields<'_>) -> String {
    let launch_time = fields.launch_time.to_string();
    let pid = fields.pid.map(|p| p.to_string()).unwrap_or_default();
    let parts = [
        fields.hostname,
        launch_time.as_str(),
        fields.vendor.unwrap_or_default(),
        fields.version_string.unwrap_or_default(),
        fields.java_home.unwrap_or_default(),
        pid.as_str(),
    ];

    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}
