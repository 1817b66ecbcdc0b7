//! Macros for defining typed label types.

/// Maximum length of any label.
pub const MAX_LABEL_LEN: usize = 253;

/// Macro to define a typed, string-backed label.
///
/// This generates a newtype wrapper around `String` with:
/// - A `KIND` constant used in error messages
/// - `new()` for unchecked construction and `parse()` for strict parsing
/// - `Display` and `FromStr` implementations
/// - `Serialize` and `Deserialize` implementations (as a plain string)
/// - `Ord`, `Hash`, and `Borrow<str>` so labels can key ordered maps
///
/// # Example
///
/// ```ignore
/// define_label!(NodeName, "node name");
///
/// let node = NodeName::new("gpu-001");
/// let parsed: NodeName = "gpu-001".parse()?;
/// ```
#[macro_export]
macro_rules! define_label {
    ($name:ident, $kind:literal) => {
        /// A typed label for this kind of entity.
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Human-readable kind used in error messages.
            pub const KIND: &'static str = $kind;

            /// Creates a label without validation.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Parses a label, rejecting empty values, whitespace and
            /// control characters.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }

                if s.len() > $crate::MAX_LABEL_LEN {
                    return Err($crate::IdError::TooLong {
                        kind: Self::KIND,
                        max: $crate::MAX_LABEL_LEN,
                        actual: s.len(),
                    });
                }

                if let Some(ch) = s.chars().find(|c| c.is_whitespace() || c.is_control()) {
                    return Err($crate::IdError::InvalidCharacter {
                        kind: Self::KIND,
                        ch,
                    });
                }

                Ok(Self(s.to_string()))
            }

            /// Returns the label as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the label is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                // Empty labels are accepted here; group normalization
                // happens in the scheduler.
                let s = String::deserialize(deserializer)?;
                Ok(Self(s))
            }
        }
    };
}
