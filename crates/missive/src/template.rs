//! Deferred content rendering.
//!
//! A [`TemplateProvider`] turns a [`TemplateContext`] into text. The context
//! carries the caller's values plus a [`MailContext`], which resolves
//! attachment file names to `cid:` references so HTML bodies can embed inline
//! images.

use crate::attachment::{Attachment, lookup_by_file_name};
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tera::Tera;

/// Name under which the attachment lookup is exposed to templates.
pub const MAIL_CONTEXT_KEY: &str = "mailContext";

const TEMPLATE_NAME: &str = "__missive_template";

/// Something that renders text from a context.
pub trait TemplateProvider {
    /// Renders the template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Templating`] if rendering fails.
    fn render(&self, context: &TemplateContext) -> Result<String>;
}

impl<F> TemplateProvider for F
where
    F: Fn(&TemplateContext) -> Result<String>,
{
    fn render(&self, context: &TemplateContext) -> Result<String> {
        self(context)
    }
}

/// Attachment lookup available while rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailContext {
    content_ids: HashMap<String, String>,
}

impl MailContext {
    /// Indexes named attachments by file name.
    #[must_use]
    pub fn new(attachments: &[Attachment]) -> Self {
        let content_ids = lookup_by_file_name(attachments)
            .into_iter()
            .map(|(name, attachment)| (name.to_string(), attachment.content_id().to_string()))
            .collect();
        Self { content_ids }
    }

    /// Returns the `cid:` reference of the attachment named `file_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Templating`] if no attachment has that name.
    pub fn insert(&self, file_name: &str) -> Result<String> {
        self.content_ids
            .get(file_name)
            .map(|id| format!("cid:{id}"))
            .ok_or_else(|| Error::templating(format!("Unable to find attachment: {file_name}")))
    }

    /// File name to `cid:` reference, for every named attachment.
    #[must_use]
    pub fn references(&self) -> HashMap<String, String> {
        self.content_ids
            .iter()
            .map(|(name, id)| (name.clone(), format!("cid:{id}")))
            .collect()
    }
}

/// Values visible to a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: HashMap<String, Value>,
    mail: MailContext,
}

impl TemplateContext {
    /// Creates a context from user values and an attachment lookup.
    #[must_use]
    pub const fn new(values: HashMap<String, Value>, mail: MailContext) -> Self {
        Self { values, mail }
    }

    /// Looks up a user value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// All user values.
    #[must_use]
    pub const fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    /// The attachment lookup.
    #[must_use]
    pub const fn mail_context(&self) -> &MailContext {
        &self.mail
    }

    fn to_tera(&self) -> tera::Context {
        let mut context = tera::Context::new();
        for (key, value) in &self.values {
            context.insert(key, value);
        }
        context.insert(MAIL_CONTEXT_KEY, &self.mail.references());
        context
    }
}

/// A Tera template.
///
/// Besides the user values, templates see `mailContext` (a map from
/// attachment file name to `cid:` reference) and an `insert(name=...)`
/// function that fails on unknown names:
///
/// ```
/// use missive::template::{MailContext, TemplateContext, TemplateProvider, TeraTemplate};
/// use std::collections::HashMap;
///
/// let mut values = HashMap::new();
/// values.insert("name".to_string(), "Ada".into());
/// let context = TemplateContext::new(values, MailContext::default());
///
/// let template = TeraTemplate::new("Hello {{ name }}");
/// assert_eq!(template.render(&context)?, "Hello Ada");
/// # Ok::<(), missive::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct TeraTemplate {
    source: String,
}

impl TeraTemplate {
    /// Creates a template from source text.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Reads a template from a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Templating`] if the file cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::read_to_string(path)
            .map(Self::new)
            .map_err(|e| Error::templating_failed(format!("Unable to read {}", path.display()), e))
    }

    /// Reads a template from a reader.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Templating`] if reading fails.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut source = String::new();
        reader
            .read_to_string(&mut source)
            .map_err(|e| Error::templating_failed("Unable to read template", e))?;
        Ok(Self::new(source))
    }

    /// The template source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

fn insert_function(mail: MailContext) -> impl tera::Function {
    move |args: &HashMap<String, tera::Value>| -> tera::Result<tera::Value> {
        let name = args
            .get("name")
            .and_then(tera::Value::as_str)
            .ok_or_else(|| tera::Error::msg("insert() requires a string `name` argument"))?;
        mail.insert(name)
            .map(tera::Value::String)
            .map_err(|e| tera::Error::msg(e.to_string()))
    }
}

impl TemplateProvider for TeraTemplate {
    fn render(&self, context: &TemplateContext) -> Result<String> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, &self.source)
            .map_err(|e| Error::templating_failed("Invalid template", e))?;
        tera.register_function("insert", insert_function(context.mail_context().clone()));
        tera.render(TEMPLATE_NAME, &context.to_tera())
            .map_err(|e| Error::templating_failed("Unable to render template", e))
    }
}
