//! Report trait and renderers.
//!
//! RULE: Every report implements Report.
//! A report gathers all of its data when it is built, so rendering is pure:
//! the same report renders the same text every time.

pub mod consistency;
pub mod overflow;
pub mod storage;
pub mod table;

/// The contract every report fulfills.
pub trait Report {
    /// Stable identifier, used for file names and logs.
    fn name(&self) -> &'static str;

    /// One-line summary, suitable as a mail subject.
    fn subject(&self) -> String;

    fn generate_plain(&self) -> String;

    /// The plain text wrapped for HTML mail.
    fn generate_html(&self) -> String {
        format!("<pre>\n{}\n</pre>\n", self.generate_plain())
    }
}

/// A boxed title line as used by every report section: `| name |`.
pub(crate) fn section_header(name: &str) -> String {
    let dashes = "-".repeat(name.chars().count() + 4);
    format!("{dashes}\n| {name} |\n")
}
