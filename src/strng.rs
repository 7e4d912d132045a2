//! Interned, cheaply-cloned string type used throughout the cache for
//! identity, label, and annotation values that get copied into many maps.

pub type Strng = arcstr::ArcStr;

/// Build a `Strng` from anything `Display`-able, mirroring the teacher's
/// `strng::new`/`strng::format!` helpers.
pub fn new(s: impl AsRef<str>) -> Strng {
	arcstr::ArcStr::from(s.as_ref())
}
