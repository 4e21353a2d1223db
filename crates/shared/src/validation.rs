//! Common validation utilities for admin request payloads.

use std::net::IpAddr;

use ipnet::IpNet;
use validator::ValidationError;

/// Validates a zero-padded `HH:MM` rule boundary (00:00 through 23:59).
pub fn validate_hhmm(value: &str) -> Result<(), ValidationError> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 5
        && bytes[2] == b':'
        && value[0..2].parse::<u8>().map(|h| h < 24).unwrap_or(false)
        && value[3..5].parse::<u8>().map(|m| m < 60).unwrap_or(false);

    if well_formed {
        Ok(())
    } else {
        let mut err = ValidationError::new("time_format");
        err.message = Some("Time must be a zero-padded HH:MM between 00:00 and 23:59".into());
        Err(err)
    }
}

/// Validates a day-of-week index (0 = Sunday through 6 = Saturday).
pub fn validate_day_of_week(day: i16) -> Result<(), ValidationError> {
    if (0..=6).contains(&day) {
        Ok(())
    } else {
        let mut err = ValidationError::new("day_of_week_range");
        err.message = Some("Day of week must be between 0 (Sunday) and 6 (Saturday)".into());
        Err(err)
    }
}

/// Validates a single allow-list entry: a bare IP or a CIDR network.
pub fn validate_ip_entry(entry: &str) -> Result<(), ValidationError> {
    let entry = entry.trim();
    if entry.parse::<IpAddr>().is_ok() || entry.parse::<IpNet>().is_ok() {
        Ok(())
    } else {
        let mut err = ValidationError::new("ip_entry");
        err.message = Some("Entry must be an IP address or CIDR network".into());
        Err(err)
    }
}

/// Validates a list of allow-list entries.
pub fn validate_ip_entries(entries: &Vec<String>) -> Result<(), ValidationError> {
    for entry in entries {
        validate_ip_entry(entry)?;
    }
    Ok(())
}
