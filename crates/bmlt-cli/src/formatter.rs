//! Rich output formatting for the CLI

use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};
use bmlt_client::ReferenceCache;
use bmlt_protocol::{
    ChangeNode, ChangeType, FormatNode, MeetingNode, ServerInfo, ServiceBody, ServiceBodyTree,
};
use comfy_table::{Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::fmt::Write as _;

/// What `validate` prints
#[derive(Debug, Serialize)]
pub struct ServerReport<'a> {
    /// Root URI the session was opened against
    pub root_uri: &'a str,
    /// Server capabilities
    pub server: &'a ServerInfo,
    /// Format entries across all languages
    pub format_count: usize,
    /// Published service bodies
    pub service_body_count: usize,
    /// Language codes
    pub languages: Vec<&'a str>,
}

impl<'a> ServerReport<'a> {
    /// Summarize a bootstrapped cache
    #[must_use]
    pub fn new(root_uri: &'a str, cache: &'a ReferenceCache) -> Self {
        Self {
            root_uri,
            server: cache.server_info(),
            format_count: cache.formats().len(),
            service_body_count: cache.service_bodies().len(),
            languages: cache.languages().iter().map(|l| l.key.as_str()).collect(),
        }
    }
}

/// Format and display output based on format preference
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    format: OutputFormat,
    colored: bool,
}

impl Formatter {
    /// Formatter for the given format; `colored` only affects human output
    #[must_use]
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    /// Print the `validate` report
    pub fn display_server(&self, report: &ServerReport<'_>) -> CliResult<()> {
        print!("{}", self.render_server(report)?);
        Ok(())
    }

    /// Print a format list
    pub fn display_formats(&self, formats: &[FormatNode]) -> CliResult<()> {
        print!("{}", self.render_formats(formats)?);
        Ok(())
    }

    /// Print the service body tree
    pub fn display_service_bodies(&self, tree: &ServiceBodyTree) -> CliResult<()> {
        print!("{}", self.render_service_bodies(tree)?);
        Ok(())
    }

    /// Print search results
    pub fn display_meetings(&self, meetings: &[MeetingNode]) -> CliResult<()> {
        print!("{}", self.render_meetings(meetings)?);
        Ok(())
    }

    /// Print change history
    pub fn display_changes(&self, changes: &[ChangeNode]) -> CliResult<()> {
        print!("{}", self.render_changes(changes)?);
        Ok(())
    }

    /// Display error with suggestions
    pub fn display_error(&self, error: &CliError) {
        let suggestions = error.suggestions();
        if self.colored {
            eprintln!("{}: {}", "Error".bright_red().bold(), error);
            if !suggestions.is_empty() {
                eprintln!("\n{}", "Suggestions:".bright_yellow().bold());
                for suggestion in suggestions {
                    eprintln!("  {} {}", "•".bright_blue(), suggestion);
                }
            }
        } else {
            eprintln!("Error: {error}");
            if !suggestions.is_empty() {
                eprintln!("\nSuggestions:");
                for suggestion in suggestions {
                    eprintln!("  • {suggestion}");
                }
            }
        }
    }

    pub(crate) fn render_server(&self, report: &ServerReport<'_>) -> CliResult<String> {
        let server = report.server;
        let rows = vec![
            ("Root URI", report.root_uri.to_string()),
            ("Version", format!("{} ({})", server.version, server.version_int)),
            ("Native language", server.native_language.clone()),
            ("Languages", report.languages.join(", ")),
            ("Distance units", server.distance_units.to_string()),
            (
                "Default location",
                format!(
                    "{}, {}",
                    server.default_location.latitude, server.default_location.longitude
                ),
            ),
            ("Change depth", server.change_depth.to_string()),
            ("Admin available", yes_no(server.admin_available)),
            ("Contact email", yes_no(server.email_contacts_enabled)),
            (
                "Service body admin email",
                yes_no(server.email_service_body_admins_enabled),
            ),
            ("Formats", report.format_count.to_string()),
            ("Service bodies", report.service_body_count.to_string()),
        ];

        match self.format {
            OutputFormat::Human => {
                let mut out = self.header("Root Server");
                for (key, value) in &rows {
                    out.push_str(&self.kv(key, value));
                }
                Ok(out)
            }
            OutputFormat::Table => {
                let mut table = table(vec!["Property", "Value"]);
                for (key, value) in rows {
                    table.add_row(vec![key.to_string(), value]);
                }
                Ok(format!("{table}\n"))
            }
            _ => self.json(report),
        }
    }

    pub(crate) fn render_formats(&self, formats: &[FormatNode]) -> CliResult<String> {
        match self.format {
            OutputFormat::Human => {
                if formats.is_empty() {
                    return Ok(self.info("No formats"));
                }
                let mut out = self.header("Formats");
                for format in formats {
                    let label = format!("{} [{}]", format.key, format.id);
                    out.push_str(&self.kv(&label, &format.name));
                }
                out.push_str(&self.footer(&format!("Total: {} formats", formats.len())));
                Ok(out)
            }
            OutputFormat::Table => {
                let mut table = table(vec!["ID", "Key", "Name", "Language", "Description"]);
                for format in formats {
                    table.add_row(vec![
                        format.id.to_string(),
                        format.key.clone(),
                        format.name.clone(),
                        format.language.clone(),
                        format.description.clone(),
                    ]);
                }
                Ok(format!("{table}\n"))
            }
            _ => self.json(formats),
        }
    }

    pub(crate) fn render_service_bodies(&self, tree: &ServiceBodyTree) -> CliResult<String> {
        match self.format {
            OutputFormat::Human => {
                if tree.is_empty() {
                    return Ok(self.info("No service bodies"));
                }
                let mut out = self.header("Service Bodies");
                for (depth, body) in tree.walk() {
                    let indent = "  ".repeat(depth + 1);
                    let label = format!("{} [{}]", body.name, body.id);
                    if self.colored {
                        let _ = writeln!(out, "{indent}{} {}", label.bright_green(), body.body_type.dimmed());
                    } else {
                        let _ = writeln!(out, "{indent}{label} {}", body.body_type);
                    }
                }
                Ok(out)
            }
            OutputFormat::Table => {
                let mut table = table(vec!["ID", "Name", "Type", "Parent"]);
                for (depth, body) in tree.walk() {
                    table.add_row(vec![
                        body.id.to_string(),
                        format!("{}{}", "  ".repeat(depth), body.name),
                        body.body_type.clone(),
                        body.parent_id.map_or_else(|| "-".to_string(), |p| p.to_string()),
                    ]);
                }
                Ok(format!("{table}\n"))
            }
            _ => {
                let flat: Vec<&ServiceBody> = tree.flat().collect();
                self.json(&flat)
            }
        }
    }

    pub(crate) fn render_meetings(&self, meetings: &[MeetingNode]) -> CliResult<String> {
        match self.format {
            OutputFormat::Human => {
                if meetings.is_empty() {
                    return Ok(self.info("No meetings found"));
                }
                let mut out = self.header("Meetings");
                for meeting in meetings {
                    let label = format!("{} [{}]", meeting.name, meeting.id);
                    out.push_str(&self.kv(&label, &meeting_when(meeting)));
                    let place = meeting_place(meeting);
                    if !place.is_empty() {
                        let _ = writeln!(out, "      {place}");
                    }
                }
                out.push_str(&self.footer(&format!("Total: {} meetings", meetings.len())));
                Ok(out)
            }
            OutputFormat::Table => {
                let mut table = table(vec!["ID", "Name", "When", "Where", "Formats", "Body"]);
                for meeting in meetings {
                    let formats: Vec<&str> = meeting.formats.iter().map(|f| f.key.as_str()).collect();
                    table.add_row(vec![
                        meeting.id.to_string(),
                        meeting.name.clone(),
                        meeting_when(meeting),
                        meeting_place(meeting),
                        formats.join(","),
                        meeting.service_body_id.to_string(),
                    ]);
                }
                Ok(format!("{table}\n"))
            }
            _ => self.json(meetings),
        }
    }

    pub(crate) fn render_changes(&self, changes: &[ChangeNode]) -> CliResult<String> {
        match self.format {
            OutputFormat::Human => {
                if changes.is_empty() {
                    return Ok(self.info("No changes"));
                }
                let mut out = self.header("Changes");
                for change in changes {
                    let label = format!(
                        "{} {} meeting {}",
                        change.timestamp.format("%Y-%m-%d %H:%M"),
                        change_label(change.change_type),
                        change.meeting_id
                    );
                    out.push_str(&self.kv(&label, &change.user_name));
                    if !change.details.is_empty() {
                        let _ = writeln!(out, "      {}", change.details);
                    }
                }
                out.push_str(&self.footer(&format!("Total: {} changes", changes.len())));
                Ok(out)
            }
            OutputFormat::Table => {
                let mut table = table(vec!["Change", "When", "Type", "Meeting", "Body", "User"]);
                for change in changes {
                    table.add_row(vec![
                        change.change_id.to_string(),
                        change.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                        change_label(change.change_type).to_string(),
                        change.meeting_id.to_string(),
                        change.service_body_id.to_string(),
                        change.user_name.clone(),
                    ]);
                }
                Ok(format!("{table}\n"))
            }
            _ => self.json(changes),
        }
    }

    // Internal formatting helpers

    fn json<T: Serialize + ?Sized>(&self, value: &T) -> CliResult<String> {
        let json = if self.format == OutputFormat::Compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }

    fn header(&self, text: &str) -> String {
        if self.colored {
            format!("\n{}\n{}\n", text.bright_cyan().bold(), "=".repeat(text.len()).bright_cyan())
        } else {
            format!("\n{text}\n{}\n", "=".repeat(text.len()))
        }
    }

    fn footer(&self, text: &str) -> String {
        if self.colored {
            format!("\n{}\n", text.bright_black())
        } else {
            format!("\n{text}\n")
        }
    }

    fn info(&self, text: &str) -> String {
        if self.colored {
            format!("{}\n", text.bright_blue())
        } else {
            format!("{text}\n")
        }
    }

    fn kv(&self, key: &str, value: &str) -> String {
        if self.colored {
            format!("  {}: {}\n", key.bright_green().bold(), value)
        } else {
            format!("  {key}: {value}\n")
        }
    }
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

fn change_label(change_type: ChangeType) -> &'static str {
    match change_type {
        ChangeType::Add => "added",
        ChangeType::Edit => "edited",
        ChangeType::Delete => "deleted",
        ChangeType::Rollback => "rolled back",
    }
}

fn meeting_when(meeting: &MeetingNode) -> String {
    let day = meeting.weekday.map(|d| d.to_string()).unwrap_or_default();
    let time = meeting
        .start_time
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default();
    format!("{day} {time}").trim().to_string()
}

fn meeting_place(meeting: &MeetingNode) -> String {
    let location = &meeting.location;
    [&location.text, &location.street, &location.municipality, &location.province]
        .into_iter()
        .filter(|part| !part.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmlt_protocol::{Location, Weekday};
    use chrono::NaiveTime;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn meeting() -> MeetingNode {
        MeetingNode {
            id: 42,
            service_body_id: 3,
            weekday: Weekday::from_index(2),
            start_time: NaiveTime::from_hms_opt(19, 30, 0),
            duration_minutes: Some(60),
            name: "Tuesday Night".to_string(),
            published: true,
            location: Location {
                text: "Church Hall".to_string(),
                municipality: "Springfield".to_string(),
                ..Location::default()
            },
            formats: vec![],
            fields: BTreeMap::new(),
        }
    }

    #[test]
    fn plain_human_meeting_listing() {
        let formatter = Formatter::new(OutputFormat::Human, false);
        let out = formatter.render_meetings(&[meeting()]).unwrap();
        assert!(out.contains("  Tuesday Night [42]: Monday 19:30\n"));
        assert!(out.contains("      Church Hall, Springfield\n"));
        assert!(out.contains("Total: 1 meetings"));
    }

    #[test]
    fn empty_lists_print_a_notice() {
        let formatter = Formatter::new(OutputFormat::Human, false);
        assert_eq!(formatter.render_meetings(&[]).unwrap(), "No meetings found\n");
        assert_eq!(formatter.render_formats(&[]).unwrap(), "No formats\n");
    }

    #[test]
    fn json_output_is_parseable() {
        let formatter = Formatter::new(OutputFormat::Compact, false);
        let out = formatter.render_meetings(&[meeting()]).unwrap();
        assert_eq!(out.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["id"], 42);
    }

    #[test]
    fn table_output_has_rows() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let out = formatter.render_meetings(&[meeting()]).unwrap();
        assert!(out.contains("Tuesday Night"));
        assert!(out.contains("Church Hall, Springfield"));
    }

    #[test]
    fn service_bodies_indent_by_depth() {
        let tree = ServiceBodyTree::build(vec![
            ServiceBody {
                id: 1,
                parent_id: None,
                name: "Region".to_string(),
                description: String::new(),
                body_type: "RS".to_string(),
            },
            ServiceBody {
                id: 2,
                parent_id: Some(1),
                name: "Area".to_string(),
                description: String::new(),
                body_type: "AS".to_string(),
            },
        ])
        .unwrap();
        let formatter = Formatter::new(OutputFormat::Human, false);
        let out = formatter.render_service_bodies(&tree).unwrap();
        assert!(out.contains("\n  Region [1] RS\n"));
        assert!(out.contains("\n    Area [2] AS\n"));
    }
}
