//! Pose input – one `sensor_msgs/JointState`-shaped JSON object per line.

use retarget_types::{Header, PoseSnapshot, Stamp};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PoseLine {
    #[serde(default)]
    header: Option<Header>,
    name: Vec<String>,
    position: Vec<f64>,
    #[serde(default)]
    velocity: Vec<f64>,
}

/// Parse one input line into a snapshot.
///
/// Blank lines and lines starting with `#` yield `Ok(None)`.  A line without
/// a `header` is stamped with the current time.
pub fn parse_line(line: &str) -> Result<Option<PoseSnapshot>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let pose: PoseLine =
        serde_json::from_str(trimmed).map_err(|e| format!("Malformed pose line: {}", e))?;
    let stamp = pose
        .header
        .map(|h| Stamp::new(h.stamp.secs, h.stamp.nsecs))
        .unwrap_or_else(Stamp::now);
    PoseSnapshot::from_joint_state(stamp, pose.name, &pose.position, &pose.velocity)
        .map(Some)
        .map_err(|e| e.to_string())
}
