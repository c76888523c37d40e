//! Pre-optimization image snapshots

use serde::{Deserialize, Serialize};

use super::location::ImageLocation;
use crate::config::defaults::BACKUP_KEY_PREFIX;
use crate::models::MenuDocument;

/// Original value of one image field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub location: ImageLocation,
    /// Decoded payload size in bytes
    pub original_size: usize,
    pub image_data: String,
}

/// Every image field an optimization run was about to touch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub timestamp: i64,
    pub images: Vec<BackupEntry>,
}

impl BackupSnapshot {
    pub fn key(&self) -> String {
        backup_key(self.timestamp)
    }

    pub fn total_size(&self) -> usize {
        self.images.iter().map(|i| i.original_size).sum()
    }

    /// Write every backed-up value into `doc`
    pub fn apply(&self, doc: &mut MenuDocument) -> RestoreReport {
        let mut report = RestoreReport::default();
        for entry in &self.images {
            if entry.location.write(doc, entry.image_data.clone()) {
                report.restored += 1;
            } else {
                report.missing.push(entry.location.clone());
            }
        }
        report
    }
}

/// Listing row for a stored snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSummary {
    pub key: String,
    pub timestamp: i64,
    pub image_count: usize,
    pub total_size: usize,
}

impl BackupSummary {
    pub(crate) fn from_snapshot(key: String, snapshot: &BackupSnapshot) -> Self {
        Self {
            key,
            timestamp: snapshot.timestamp,
            image_count: snapshot.images.len(),
            total_size: snapshot.total_size(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub restored: usize,
    /// Locations whose record no longer exists
    pub missing: Vec<ImageLocation>,
}

pub fn backup_key(timestamp: i64) -> String {
    format!("{BACKUP_KEY_PREFIX}{timestamp}")
}

/// Timestamp encoded in a backup key
pub fn parse_backup_key(key: &str) -> Option<i64> {
    key.strip_prefix(BACKUP_KEY_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_round_trip() {
        assert_eq!(backup_key(1_700_000_000_000), "imageBackup_1700000000000");
        assert_eq!(parse_backup_key("imageBackup_42"), Some(42));
        assert_eq!(parse_backup_key("imageBackup_x"), None);
        assert_eq!(parse_backup_key("menu_admin_cache"), None);
    }

    #[test]
    fn test_snapshot_wire_format() {
        let snapshot = BackupSnapshot {
            timestamp: 5,
            images: vec![BackupEntry {
                location: ImageLocation::RestaurantLogo,
                original_size: 3,
                image_data: "data:image/png;base64,AAAA".into(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            json!({
                "timestamp": 5,
                "images": [{
                    "location": {"kind": "restaurant_logo"},
                    "originalSize": 3,
                    "imageData": "data:image/png;base64,AAAA"
                }]
            })
        );
    }

    #[test]
    fn test_apply_reports_missing_records() {
        let mut doc: MenuDocument = serde_json::from_value(json!({
            "products": [{"id": "p1", "name": "Soup", "image": "data:image/jpeg;base64,BBBB"}]
        }))
        .unwrap();
        let snapshot = BackupSnapshot {
            timestamp: 1,
            images: vec![
                BackupEntry {
                    location: ImageLocation::Product { id: "p1".into() },
                    original_size: 3,
                    image_data: "data:image/png;base64,AAAA".into(),
                },
                BackupEntry {
                    location: ImageLocation::Product { id: "gone".into() },
                    original_size: 3,
                    image_data: "data:image/png;base64,AAAA".into(),
                },
            ],
        };

        let report = snapshot.apply(&mut doc);
        assert_eq!(report.restored, 1);
        assert_eq!(report.missing, vec![ImageLocation::Product { id: "gone".into() }]);
        assert_eq!(
            doc.products[0].image.as_deref(),
            Some("data:image/png;base64,AAAA")
        );
    }
}
