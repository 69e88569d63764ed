//! Activity records.

use crate::context::{render, Context};
use crate::error::Result;
use crate::types::{ActivityId, EntityRef, StreamId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An immutable fact produced by a lifecycle or comment event.
///
/// Only `streams` changes after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,

    /// Title template with `{name}` placeholders.
    pub title: String,

    /// Kind of event, e.g. `"ticket-created"`.
    pub signature: String,

    /// Description template; the rendered title is used when absent.
    pub template: Option<String>,

    /// Encoded [`Context`].
    pub context: String,

    pub created_at: Timestamp,

    pub streams: BTreeSet<StreamId>,

    pub backlink: Option<String>,

    /// Entity the activity is about.
    pub source: Option<EntityRef>,
}

impl Activity {
    pub fn context(&self) -> Result<Context> {
        Context::decode(&self.context)
    }

    pub fn render_title(&self) -> Result<String> {
        Ok(render(&self.title, &self.context()?))
    }

    pub fn render_description(&self) -> Result<String> {
        let context = self.context()?;
        Ok(render(self.template.as_deref().unwrap_or(&self.title), &context))
    }

    pub fn is_orphaned(&self) -> bool {
        self.streams.is_empty()
    }
}

/// Input for a new activity (before id and timestamp are assigned).
#[derive(Clone, Debug)]
pub struct ActivityDraft {
    pub signature: String,
    pub title: String,
    pub template: Option<String>,
    pub context: Context,
    pub backlink: Option<String>,
    pub source: Option<EntityRef>,
}

impl ActivityDraft {
    pub fn new(signature: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            title: title.into(),
            template: None,
            context: Context::new(),
            backlink: None,
            source: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn with_backlink(mut self, backlink: Option<String>) -> Self {
        self.backlink = backlink;
        self
    }

    pub fn with_source(mut self, source: EntityRef) -> Self {
        self.source = Some(source);
        self
    }
}
