//! Values a host program interpolates into a script

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use husk_ast::HostSlot;
use husk_lexer::host_placeholder;

/// A byte buffer shared between the host and a running script.
///
/// Redirecting into it (`cmd > ${buffer}`) replaces the contents and `>>`
/// appends; reading from it (`cmd < ${buffer}`) feeds a snapshot of the
/// current contents.
#[derive(Clone, Default)]
pub struct HostBuffer(Arc<Mutex<Vec<u8>>>);

impl HostBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, bytes: &[u8]) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(bytes);
    }

    /// Copy of the current contents
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Take the contents, leaving the buffer empty
    #[must_use]
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.snapshot()).into_owned()
    }
}

impl fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostBuffer").field(&self.len()).finish()
    }
}

/// An interpolated host value
#[derive(Debug, Clone)]
pub enum HostValue {
    /// Spliced in as one literal word
    Text(String),
    /// Spliced in as one literal word
    Path(PathBuf),
    /// One literal word per element
    List(Vec<String>),
    /// Input source for `<`
    Bytes(Arc<[u8]>),
    /// Output target for `>`, `>>`, or input snapshot for `<`
    Buffer(HostBuffer),
}

impl HostValue {
    /// What the lexer sees in place of this value
    #[must_use]
    pub fn slot(&self) -> HostSlot {
        match self {
            Self::Text(text) => HostSlot::Text(text.clone()),
            Self::Path(path) => HostSlot::Text(path.display().to_string()),
            Self::List(items) => HostSlot::List(items.clone()),
            Self::Bytes(_) | Self::Buffer(_) => HostSlot::Object,
        }
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<PathBuf> for HostValue {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&std::path::Path> for HostValue {
    fn from(value: &std::path::Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<String>> for HostValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<&[&str]> for HostValue {
    fn from(value: &[&str]) -> Self {
        Self::List(value.iter().map(|s| (*s).to_string()).collect())
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value.into())
    }
}

impl From<HostBuffer> for HostValue {
    fn from(value: HostBuffer) -> Self {
        Self::Buffer(value)
    }
}

impl From<&HostBuffer> for HostValue {
    fn from(value: &HostBuffer) -> Self {
        Self::Buffer(value.clone())
    }
}

/// Script text with interpolated host values.
///
/// ```
/// use husk_interpreter::Template;
///
/// let name = "my file.txt";
/// let template = Template::new().text("touch ").value(name).text(" && ls");
/// assert_eq!(template.values().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Template {
    source: String,
    values: Vec<HostValue>,
}

impl Template {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append script text
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.source.push_str(text);
        self
    }

    /// Append a host value; it is never re-read as script text
    #[must_use]
    pub fn value(mut self, value: impl Into<HostValue>) -> Self {
        self.source.push_str(&host_placeholder(self.values.len()));
        self.values.push(value.into());
        self
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn values(&self) -> &[HostValue] {
        &self.values
    }

    #[must_use]
    pub fn slots(&self) -> Vec<HostSlot> {
        self.values.iter().map(HostValue::slot).collect()
    }
}

impl From<&str> for Template {
    fn from(source: &str) -> Self {
        Self::new().text(source)
    }
}

impl From<String> for Template {
    fn from(source: String) -> Self {
        Self {
            source,
            values: Vec::new(),
        }
    }
}
