//! Composite outcome reporting for pipeline runs.
//!
//! Every phase, operand and artifact request reports a [`Status`]. Statuses nest:
//! a run status holds one child per phase, a phase status holds one child per
//! failing operand or artifact. The severity of a parent is always the maximum
//! severity of itself and its children.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome severity, ordered `Ok < Warning < Error < Cancel`.
///
/// `Cancel` sorts above `Error` so that folding children with `max` lets a
/// cancellation dominate every other outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Error,
    Cancel,
}

impl Severity {
    /// True for `Error` and `Cancel`.
    pub fn is_failure(self) -> bool {
        self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Cancel => "CANCEL",
        };
        f.write_str(label)
    }
}

/// Outcome of one unit of work, optionally aggregating child outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    severity: Severity,
    message: String,

    /// Identity of the thing this status is about (artifact key, unit, phase id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject: Option<String>,

    /// Marks a failure that must stop the remaining operands of a phase.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    fatal: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Status>,
}

impl Status {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            subject: None,
            fatal: false,
            children: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(Severity::Ok, "")
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn cancel() -> Self {
        Self::new(Severity::Cancel, "Operation cancelled")
    }

    /// An empty aggregate; its severity rises as children are added.
    pub fn multi(message: impl Into<String>) -> Self {
        Self::new(Severity::Ok, message)
    }

    /// Convert an error chain into an `Error` status, keeping every cause in the message.
    pub fn from_error(error: &anyhow::Error) -> Self {
        Self::error(format!("{error:#}"))
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Flag this outcome as fatal for the enclosing phase.
    pub fn into_fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn children(&self) -> &[Status] {
        &self.children
    }

    pub fn is_ok(&self) -> bool {
        self.severity == Severity::Ok
    }

    pub fn is_cancel(&self) -> bool {
        self.severity == Severity::Cancel
    }

    /// True if this status or any descendant was flagged fatal.
    pub fn is_fatal(&self) -> bool {
        self.fatal || self.children.iter().any(Status::is_fatal)
    }

    /// Append a child and raise this status' severity to match it.
    pub fn add(&mut self, child: Status) {
        self.severity = self.severity.max(child.severity);
        self.children.push(child);
    }

    /// Fold another status into this one.
    ///
    /// Anonymous aggregates contribute their children and fatal marker. An
    /// aggregate with a subject is added whole, and a plain status is added as a
    /// child unless it is an empty `Ok`.
    pub fn merge(&mut self, other: Status) {
        if other.children.is_empty() {
            if !other.is_ok() || other.fatal {
                self.add(other);
            }
            return;
        }
        if other.subject.is_some() {
            self.add(other);
            return;
        }
        self.severity = self.severity.max(other.severity);
        self.fatal |= other.fatal;
        for child in other.children {
            self.add(child);
        }
    }

    /// Depth-first search for a status about `subject`.
    pub fn find_subject(&self, subject: &str) -> Option<&Status> {
        if self.subject.as_deref() == Some(subject) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_subject(subject))
    }

    /// Leaf statuses with severity at or above `threshold`.
    pub fn problems(&self, threshold: Severity) -> Vec<&Status> {
        let mut out = Vec::new();
        self.collect_problems(threshold, &mut out);
        out
    }

    fn collect_problems<'a>(&'a self, threshold: Severity, out: &mut Vec<&'a Status>) {
        if self.children.is_empty() {
            if self.severity >= threshold {
                out.push(self);
            }
            return;
        }
        for child in &self.children {
            child.collect_problems(threshold, out);
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.severity, indent = depth * 2)?;
        if let Some(subject) = &self.subject {
            write!(f, " [{subject}]")?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        for child in &self.children {
            writeln!(f)?;
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_puts_cancel_on_top() {
        assert!(Severity::Ok < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Cancel);
        assert!(Severity::Cancel.is_failure());
        assert!(!Severity::Warning.is_failure());
    }

    #[test]
    fn add_raises_parent_severity() {
        let mut status = Status::multi("phase");
        status.add(Status::warning("slow mirror"));
        assert_eq!(status.severity(), Severity::Warning);

        status.add(Status::error("missing artifact"));
        assert_eq!(status.severity(), Severity::Error);

        status.add(Status::ok());
        assert_eq!(status.severity(), Severity::Error);
        assert_eq!(status.children().len(), 3);
    }

    #[test]
    fn cancel_dominates_error() {
        let mut status = Status::multi("run");
        status.add(Status::error("boom"));
        status.add(Status::cancel());
        assert!(status.is_cancel());
    }

    #[test]
    fn merge_flattens_aggregates_and_skips_plain_ok() {
        let mut inner = Status::multi("collect");
        inner.add(Status::error("a").with_subject("osgi.bundle,a,1.0.0"));
        inner.add(Status::error("b").with_subject("osgi.bundle,b,1.0.0"));

        let mut outer = Status::multi("phase");
        outer.merge(Status::ok());
        assert!(outer.children().is_empty());

        outer.merge(inner);
        assert_eq!(outer.children().len(), 2);
        assert_eq!(outer.severity(), Severity::Error);
        assert!(outer.find_subject("osgi.bundle,b,1.0.0").is_some());
    }

    #[test]
    fn merge_keeps_fatal_marker_of_aggregate() {
        let mut inner = Status::multi("collect").into_fatal();
        inner.add(Status::error("mirror unreachable"));

        let mut outer = Status::multi("phase");
        outer.merge(inner);
        assert!(outer.is_fatal());
        assert_eq!(outer.severity(), Severity::Error);
    }

    #[test]
    fn merge_keeps_aggregate_with_subject_whole() {
        let mut inner = Status::multi("trust check failed").with_subject("binary,tool,2.0.0");
        inner.add(Status::error("bad signature"));

        let mut outer = Status::multi("phase");
        outer.merge(inner);
        assert_eq!(outer.children().len(), 1);
        let kept = outer.find_subject("binary,tool,2.0.0").unwrap();
        assert_eq!(kept.message(), "trust check failed");
        assert_eq!(kept.children().len(), 1);
    }

    #[test]
    fn fatal_marker_propagates_through_children() {
        let mut status = Status::multi("phase");
        status.add(Status::error("disk full").into_fatal());
        assert!(status.is_fatal());
    }

    #[test]
    fn problems_lists_failing_leaves() {
        let mut nested = Status::multi("operand");
        nested.add(Status::warning("w"));
        nested.add(Status::error("e"));
        let mut root = Status::multi("run");
        root.add(nested);
        root.add(Status::ok());

        let problems = root.problems(Severity::Error);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].message(), "e");
    }

    #[test]
    fn display_renders_tree() {
        let mut root = Status::multi("run");
        root.add(Status::error("bad signature").with_subject("binary,tool,2.0.0"));
        let rendered = root.to_string();
        assert!(rendered.starts_with("ERROR: run"));
        assert!(rendered.contains("  ERROR [binary,tool,2.0.0]: bad signature"));
    }
}
