//! Terminal formatting for listings and upload results.

use bucket_browser_store_models::ObjectEntry;
use bucket_browser_upload_models::ItemSnapshot;

/// Formats a byte count with a binary unit (`1.5 MB`).
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    #[allow(clippy::cast_precision_loss)] // display-only value
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

pub fn print_entries(entries: &[ObjectEntry]) {
    println!("{:>10}  {:<20}  KEY", "SIZE", "MODIFIED");
    println!("{}", "-".repeat(60));
    for entry in entries {
        let size = if entry.is_folder() {
            "-".to_string()
        } else {
            format_size(entry.size)
        };
        let modified = entry
            .last_modified
            .map_or_else(String::new, |t| t.format("%Y-%m-%d %H:%M").to_string());
        println!("{size:>10}  {modified:<20}  {}", entry.key);
    }
}

pub fn print_items(items: &[ItemSnapshot]) {
    for item in items {
        match &item.error {
            Some(error) => println!("{:<10} {}  ({error})", item.status, item.target_key),
            None => println!("{:<10} {}", item.status, item.target_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(12 * 1024 * 1024), "12.0 MB");
    }
}
