//! Named identifiers
//!
//! A [`Name`] is an index into the package name table plus, from UE3 on, an
//! instance number. Text is resolved against the table installed with
//! [`ArchiveState::set_names`](crate::archive::ArchiveState::set_names);
//! without a table the name stays unresolved and reads as `None`.

use std::fmt;
use std::sync::Arc;

use crate::archive::{Archive, Serializable, SerializeExt};
use crate::compact::serialize_index;
use crate::error::{ArchiveError, Result};
use crate::profile::NameSuffixStyle;
use crate::type_info::TypeInfo;

const NONE_TEXT: &str = "None";

#[derive(Debug, Clone, Default)]
enum NameText {
    #[default]
    Unresolved,
    Table(Arc<str>),
    Generated(String),
}

/// Name table reference with an optional numeric suffix
#[derive(Debug, Clone, Default)]
pub struct Name {
    index: i32,
    extra_index: i32,
    text: NameText,
}

impl Name {
    /// Create a name with known text and no table index
    pub fn new(text: &str) -> Self {
        Self {
            index: 0,
            extra_index: 0,
            text: NameText::Table(Arc::from(text)),
        }
    }

    /// Create an unresolved name from its table index and instance number
    pub const fn from_index(index: i32, extra_index: i32) -> Self {
        Self {
            index,
            extra_index,
            text: NameText::Unresolved,
        }
    }

    /// Index into the name table
    pub const fn index(&self) -> i32 {
        self.index
    }

    /// Instance number; 0 means no suffix, `n` means suffix `n - 1`
    pub const fn extra_index(&self) -> i32 {
        self.extra_index
    }

    /// Whether the text came from a name table or was given explicitly
    pub const fn is_resolved(&self) -> bool {
        !matches!(self.text, NameText::Unresolved)
    }

    /// Whether the numeric suffix has been materialized
    pub const fn is_generated(&self) -> bool {
        matches!(self.text, NameText::Generated(_))
    }

    /// Text of the name
    pub fn text(&self) -> &str {
        match &self.text {
            NameText::Unresolved => NONE_TEXT,
            NameText::Table(text) => text,
            NameText::Generated(text) => text,
        }
    }

    /// Whether this is the `None` name
    pub fn is_none(&self) -> bool {
        self.text().eq_ignore_ascii_case(NONE_TEXT)
    }

    /// Append the instance suffix to the text
    ///
    /// Runs at most once per name and does nothing when the instance number
    /// is zero.
    pub fn append_index(&mut self, style: NameSuffixStyle) -> &str {
        if self.extra_index != 0 && !self.is_generated() {
            let suffix = self.extra_index - 1;
            let text = match style {
                NameSuffixStyle::Underscore => format!("{}_{}", self.text(), suffix),
                NameSuffixStyle::Concatenated => format!("{}{}", self.text(), suffix),
            };
            self.text = NameText::Generated(text);
        }
        self.text()
    }

    fn resolve<A: Archive + ?Sized>(&mut self, ar: &A) -> Result<()> {
        let Some(names) = ar.state().names() else {
            self.text = NameText::Unresolved;
            return Ok(());
        };
        let entry = usize::try_from(self.index)
            .ok()
            .and_then(|i| names.get(i))
            .ok_or(ArchiveError::NameIndexOutOfRange {
                index: self.index,
                len: names.len(),
            })?;
        self.text = NameText::Table(Arc::clone(entry));
        Ok(())
    }

    fn transfer_fields<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let quirks = *ar.context().quirks();
        serialize_index(ar, &mut self.index)?;
        if quirks.name_instance_number {
            ar.transfer(&mut self.extra_index)?;
        }
        if ar.is_loading() {
            self.resolve(ar)?;
            if quirks.name_suffix == NameSuffixStyle::Concatenated {
                self.append_index(NameSuffixStyle::Concatenated);
            }
        }
        Ok(())
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.text().eq_ignore_ascii_case(other.text())
    }
}

impl Eq for Name {}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.text().eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

impl Serializable for Name {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let start = ar.tell();
        self.transfer_fields(ar)
            .map_err(|e| e.in_operation("FName", start))
    }
}

impl TypeInfo for Name {}
