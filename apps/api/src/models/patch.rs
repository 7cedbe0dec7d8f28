use serde::{Deserialize, Deserializer};

/// One nullable column in a partial update.
///
/// An absent JSON field leaves the column alone, an explicit `null` clears it.
/// Text values are normalized with [`Patch::trimmed`], which turns blanks into
/// a clear as well.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    /// Whether the column is written at all.
    pub fn touches(&self) -> bool {
        !matches!(self, Patch::Keep)
    }

    /// The value to write when the column is touched; `None` means NULL.
    pub fn value(&self) -> Option<&T> {
        match self {
            Patch::Set(v) => Some(v),
            Patch::Keep | Patch::Clear => None,
        }
    }
}

impl Patch<String> {
    pub fn trimmed(self) -> Self {
        match self {
            Patch::Set(v) if v.trim().is_empty() => Patch::Clear,
            Patch::Set(v) => Patch::Set(v.trim().to_string()),
            other => other,
        }
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.value().map(String::as_str)
    }
}

// Fields of this type carry `#[serde(default)]`, so this only runs when the
// key is present.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        })
    }
}
