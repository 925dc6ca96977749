//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a table
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        print_warning("Nothing to show");
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(60));
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Bytes as a binary-suffixed quantity
pub fn format_bytes(bytes: f64) -> String {
    const KI: f64 = 1024.0;
    const MI: f64 = KI * 1024.0;
    const GI: f64 = MI * 1024.0;

    if bytes >= GI {
        format!("{:.2}Gi", bytes / GI)
    } else if bytes >= MI {
        format!("{:.2}Mi", bytes / MI)
    } else if bytes >= KI {
        format!("{:.2}Ki", bytes / KI)
    } else {
        format!("{:.0}B", bytes)
    }
}

/// Cores, shown in millicores below one core
pub fn format_cpu(cores: f64) -> String {
    if cores >= 1.0 {
        format!("{:.2}", cores)
    } else {
        format!("{:.0}m", cores * 1000.0)
    }
}

/// Replica change, green when growing
pub fn format_change(from: u32, to: u32) -> String {
    let change = format!("{} → {}", from, to);
    if to > from {
        change.green().to_string()
    } else {
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512.0), "512B");
        assert_eq!(format_bytes(2048.0), "2.00Ki");
        assert_eq!(format_bytes(134_217_728.0), "128.00Mi");
        assert_eq!(format_bytes(3.0 * 1024.0 * 1024.0 * 1024.0), "3.00Gi");
    }

    #[test]
    fn test_format_cpu() {
        assert_eq!(format_cpu(0.25), "250m");
        assert_eq!(format_cpu(1.5), "1.50");
    }

    #[test]
    fn test_format_change_unchanged() {
        assert_eq!(format_change(3, 3), "3 → 3");
    }
}
