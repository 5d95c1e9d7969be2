use uuid::Uuid;

pub const SERIES_ID_PREFIX: &str = "SER";
pub const SCAN_ID_PREFIX: &str = "SCN";

/// Hex characters kept from the digest / UUID.
const ID_HEX_LENGTH: usize = 12;

/// Stable record identifier for a series: `SER` followed by the first 12 hex
/// digits of the MD5 digest of the series UID, uppercased.
pub fn series_record_id(series_uid: &str) -> String {
    let digest = format!("{:x}", md5::compute(series_uid.as_bytes()));
    format!(
        "{}{}",
        SERIES_ID_PREFIX,
        digest[..ID_HEX_LENGTH].to_uppercase()
    )
}

pub fn new_scan_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}{}", SCAN_ID_PREFIX, hex[..ID_HEX_LENGTH].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_series_id_is_deterministic() {
        let uid = "1.2.840.113619.2.55.3.604688119.971.1234567890.1";
        assert_eq!(series_record_id(uid), series_record_id(uid));
        assert_eq!(series_record_id(uid), "SER633E02B1CDAB");
        assert_eq!(series_record_id("1.2.3"), "SERB0E8DAA258AC");
    }

    #[test]
    fn test_series_id_shape() {
        let id = series_record_id("1.2.3.4.5");
        assert_eq!(id.len(), SERIES_ID_PREFIX.len() + ID_HEX_LENGTH);
        assert!(id.starts_with(SERIES_ID_PREFIX));
        assert!(id[3..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_distinct_uids_yield_distinct_ids() {
        let ids: HashSet<String> = (0..10_000)
            .map(|i| series_record_id(&format!("1.2.826.0.1.3680043.{}", i)))
            .collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_scan_ids_are_unique() {
        let a = new_scan_id();
        let b = new_scan_id();
        assert!(a.starts_with(SCAN_ID_PREFIX));
        assert_eq!(a.len(), 15);
        assert_ne!(a, b);
    }
}
