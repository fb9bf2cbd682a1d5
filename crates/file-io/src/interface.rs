use std::fmt;

/// A versioned interface identifier, `name(current:revision:age)`.
///
/// `current` is the newest interface version implemented, `revision` counts
/// compatible changes within it, and `age` is how many older versions are still
/// understood. Layers store these alongside their data so an incompatible reader
/// can refuse it up front.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interface {
	pub name: String,
	pub current: u32,
	pub revision: u32,
	pub age: u32,
}

impl Interface {
	#[must_use]
	pub fn new(name: impl Into<String>, current: u32, revision: u32, age: u32) -> Self {
		Self {
			name: name.into(),
			current,
			revision,
			age,
		}
	}

	/// Whether data written against `other` can be handled by an implementation of `self`.
	#[must_use]
	pub fn implements(&self, other: &Self) -> bool {
		self.name == other.name
			&& other.current <= self.current
			&& self.current - other.current <= self.age
	}
}

impl fmt::Display for Interface {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}({}:{}:{})",
			self.name, self.current, self.revision, self.age
		)
	}
}
