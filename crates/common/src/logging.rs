//! Context-carrying task logger.
//!
//! `TaskLogger` is a plain value: it holds the identifiers of the pipeline,
//! job, task and run being executed plus the name of the component doing the
//! logging. Every record is emitted through `tracing` with the identifiers
//! rendered as a `[P:..][J:..][T:..][R:..]` prefix. Components derive their
//! own logger with [`TaskLogger::for_component`], which keeps the identifiers
//! and swaps the component name.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Target used for operator-facing notable events.
pub const EVENT_TARGET: &str = "rusty_archival::event";

/// Identifier and display name of one level of the execution hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTag {
    /// Stable identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
}

impl ContextTag {
    /// Create a new tag.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Identifiers attached to every log line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogContext {
    pub pipeline: Option<ContextTag>,
    pub job: Option<ContextTag>,
    pub task: Option<ContextTag>,
    pub run: Option<ContextTag>,
}

impl LogContext {
    /// Set the pipeline identifiers.
    pub fn with_pipeline(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.pipeline = Some(ContextTag::new(id, name));
        self
    }

    /// Set the job identifiers.
    pub fn with_job(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.job = Some(ContextTag::new(id, name));
        self
    }

    /// Set the task identifiers.
    pub fn with_task(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.task = Some(ContextTag::new(id, name));
        self
    }

    /// Set the run identifiers.
    pub fn with_run(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.run = Some(ContextTag::new(id, name));
        self
    }

    /// Render the identifiers as a message prefix.
    ///
    /// # Returns
    /// `[P:id:name][J:id:name][T:id:name][R:id:name]` with absent levels
    /// omitted, followed by a space when anything was rendered.
    pub fn prefix(&self) -> String {
        let levels: [(&str, &Option<ContextTag>); 4] = [
            ("P", &self.pipeline),
            ("J", &self.job),
            ("T", &self.task),
            ("R", &self.run),
        ];

        let mut prefix: String = String::new();
        for (label, tag) in levels {
            if let Some(tag) = tag {
                prefix.push_str(&format!("[{}:{}:{}]", label, tag.id, tag.name));
            }
        }
        if !prefix.is_empty() {
            prefix.push(' ');
        }
        prefix
    }
}

/// Logger value bound to a component and a task context.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    context: LogContext,
    component: String,
    prefix: String,
}

impl TaskLogger {
    /// Create a logger with an empty context.
    ///
    /// # Arguments
    /// * `component` - Name of the component emitting records
    pub fn new(component: impl Into<String>) -> Self {
        Self::with_context(component, LogContext::default())
    }

    /// Create a logger carrying the given identifiers.
    ///
    /// # Arguments
    /// * `component` - Name of the component emitting records
    /// * `context` - Pipeline/job/task/run identifiers
    pub fn with_context(component: impl Into<String>, context: LogContext) -> Self {
        let prefix: String = context.prefix();
        Self {
            context,
            component: component.into(),
            prefix,
        }
    }

    /// Derive a logger for a sub-component that keeps this logger's identifiers.
    ///
    /// # Arguments
    /// * `component` - Name of the child component
    pub fn for_component(&self, component: impl Into<String>) -> Self {
        Self {
            context: self.context.clone(),
            component: component.into(),
            prefix: self.prefix.clone(),
        }
    }

    /// Component this logger is bound to.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Identifiers carried by this logger.
    pub fn context(&self) -> &LogContext {
        &self.context
    }

    /// Format a message with the context prefix.
    pub fn format_message(&self, message: impl Display) -> String {
        format!("{}{}", self.prefix, message)
    }

    pub fn trace(&self, message: impl Display) {
        tracing::trace!(component = %self.component, "{}{}", self.prefix, message);
    }

    pub fn debug(&self, message: impl Display) {
        tracing::debug!(component = %self.component, "{}{}", self.prefix, message);
    }

    pub fn info(&self, message: impl Display) {
        tracing::info!(component = %self.component, "{}{}", self.prefix, message);
    }

    pub fn warn(&self, message: impl Display) {
        tracing::warn!(component = %self.component, "{}{}", self.prefix, message);
    }

    pub fn error(&self, message: impl Display) {
        tracing::error!(component = %self.component, "{}{}", self.prefix, message);
    }

    /// Operator-facing informational event.
    pub fn event_info(&self, message: impl Display) {
        tracing::info!(target: EVENT_TARGET, component = %self.component, "{}{}", self.prefix, message);
    }

    /// Operator-facing warning event.
    pub fn event_warn(&self, message: impl Display) {
        tracing::warn!(target: EVENT_TARGET, component = %self.component, "{}{}", self.prefix, message);
    }

    /// Operator-facing error event.
    pub fn event_error(&self, message: impl Display) {
        tracing::error!(target: EVENT_TARGET, component = %self.component, "{}{}", self.prefix, message);
    }

    /// Operator-facing event marking the task as failed.
    pub fn event_failure(&self, message: impl Display) {
        tracing::error!(
            target: EVENT_TARGET,
            component = %self.component,
            failure = true,
            "{}{}",
            self.prefix,
            message
        );
    }
}

impl Display for TaskLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_empty_context() {
        let logger: TaskLogger = TaskLogger::new("engine");
        assert_eq!(logger.format_message("hello"), "hello");
    }

    #[test]
    fn test_prefix_partial_context() {
        let context: LogContext = LogContext::default()
            .with_pipeline("p1", "nightly")
            .with_task("t7", "upload");
        let logger: TaskLogger = TaskLogger::with_context("engine", context);
        assert_eq!(
            logger.format_message("hello"),
            "[P:p1:nightly][T:t7:upload] hello"
        );
    }

    #[test]
    fn test_for_component_keeps_context() {
        let context: LogContext = LogContext::default()
            .with_pipeline("p1", "nightly")
            .with_job("j2", "ingest")
            .with_task("t3", "sync")
            .with_run("r4", "first");
        let parent: TaskLogger = TaskLogger::with_context("engine", context.clone());
        let child: TaskLogger = parent.for_component("object-storage");

        assert_eq!(child.component(), "object-storage");
        assert_eq!(parent.component(), "engine");
        assert_eq!(child.context(), &context);
        assert_eq!(
            child.format_message("x"),
            "[P:p1:nightly][J:j2:ingest][T:t3:sync][R:r4:first] x"
        );
    }
}
