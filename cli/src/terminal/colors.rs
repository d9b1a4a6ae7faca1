use colored::Color;

pub const PRIMARY: Color = Color::BrightGreen;
pub const ACCENT: Color = Color::BrightCyan;
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;

pub const IPV4_ADDR: Color = Color::BrightBlue;
pub const IPV6_ADDR: Color = Color::BrightMagenta;
pub const MAC_ADDR: Color = Color::Yellow;
pub const PORT: Color = Color::Cyan;

pub const OK: Color = Color::Green;
pub const CLOSED: Color = Color::Yellow;
pub const SILENT: Color = Color::BrightBlack;
pub const FAILED: Color = Color::Red;
