//! Serialization guard
//!
//! Converts any captured value into a `serde_json::Value` that is safe to
//! move across a context boundary. The value is serialized to JSON bytes and
//! parsed back, so the result is a structural clone with no shared state.
//!
//! The guard never fails outward. Anything that cannot be cloned this way
//! degrades to [`UNSERIALIZABLE_SENTINEL`]:
//! - a `Serialize` impl that returns an error (or panics)
//! - maps whose keys are not strings
//! - nesting deeper than [`MAX_SNAPSHOT_DEPTH`], which is also how
//!   self-referential `Rc<RefCell<_>>` graphs terminate

use serde::Serialize;
use serde_json::ser::{CompactFormatter, Formatter};
use serde_json::Value;
use std::io;
use std::panic::{self, AssertUnwindSafe};

pub use crate::constants::{MAX_SNAPSHOT_DEPTH, UNSERIALIZABLE_SENTINEL};

/// Structurally clone `value`, or return the sentinel
pub fn snapshot<T: Serialize + ?Sized>(value: &T) -> Value {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| clone_via_json(value)));
    match attempt {
        Ok(Ok(cloned)) => cloned,
        Ok(Err(err)) => {
            log::trace!(target: "devbridge::guard", "value replaced by sentinel: {}", err);
            sentinel()
        }
        Err(_) => {
            log::trace!(target: "devbridge::guard", "value replaced by sentinel: serializer panicked");
            sentinel()
        }
    }
}

/// Snapshot every element, preserving count and order
pub fn snapshot_all<T: Serialize>(values: &[T]) -> Vec<Value> {
    values.iter().map(snapshot).collect()
}

/// The substitute emitted for unserializable values
pub fn sentinel() -> Value {
    Value::String(UNSERIALIZABLE_SENTINEL.to_string())
}

/// Whether a captured value is the sentinel
pub fn is_sentinel(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == UNSERIALIZABLE_SENTINEL)
}

fn clone_via_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Value> {
    let mut buffer = Vec::with_capacity(128);
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buffer, DepthLimited::new(MAX_SNAPSHOT_DEPTH));
    value.serialize(&mut serializer)?;
    serde_json::from_slice(&buffer)
}

/// Compact JSON formatter that refuses to open containers past a depth
struct DepthLimited {
    depth: usize,
    max_depth: usize,
    inner: CompactFormatter,
}

impl DepthLimited {
    fn new(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
            inner: CompactFormatter,
        }
    }

    fn enter(&mut self) -> io::Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("nesting deeper than {} levels", self.max_depth),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

impl Formatter for DepthLimited {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.enter()?;
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.leave();
        self.inner.end_array(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.enter()?;
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.leave();
        self.inner.end_object(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::{Error as _, Serializer};
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Serialize)]
    struct User {
        name: String,
        roles: Vec<&'static str>,
        active: bool,
    }

    struct Failing;

    impl Serialize for Failing {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("not representable"))
        }
    }

    struct Panicking;

    impl Serialize for Panicking {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            panic!("getter blew up")
        }
    }

    /// Node that serializes its children through shared pointers
    struct Node {
        children: Vec<Rc<RefCell<Node>>>,
    }

    impl Serialize for Node {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            use serde::ser::SerializeMap;
            let mut map = serializer.serialize_map(Some(1))?;
            let children: Vec<_> = self.children.iter().map(|c| NodeRef(c.clone())).collect();
            map.serialize_entry("children", &children)?;
            map.end()
        }
    }

    struct NodeRef(Rc<RefCell<Node>>);

    impl Serialize for NodeRef {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self.0.try_borrow() {
                Ok(node) => node.serialize(serializer),
                Err(_) => Err(S::Error::custom("node already borrowed")),
            }
        }
    }

    #[test]
    fn test_plain_values_are_cloned() {
        assert_eq!(snapshot("disk low"), json!("disk low"));
        assert_eq!(snapshot(&42), json!(42));
        assert_eq!(snapshot(&Some(1.5)), json!(1.5));
        assert_eq!(snapshot(&json!({"pct": 5})), json!({"pct": 5}));
    }

    #[test]
    fn test_structs_are_cloned() {
        let user = User {
            name: "ada".to_string(),
            roles: vec!["admin"],
            active: true,
        };
        assert_eq!(
            snapshot(&user),
            json!({"name": "ada", "roles": ["admin"], "active": true})
        );
    }

    #[test]
    fn test_failing_serialize_yields_sentinel() {
        assert!(is_sentinel(&snapshot(&Failing)));
    }

    #[test]
    fn test_panicking_serialize_yields_sentinel() {
        assert!(is_sentinel(&snapshot(&Panicking)));
    }

    #[test]
    fn test_non_string_map_keys_yield_sentinel() {
        let mut map = HashMap::new();
        map.insert(vec![1u8, 2], "composite key");
        assert!(is_sentinel(&snapshot(&map)));
    }

    #[test]
    fn test_non_finite_floats_become_null() {
        assert_eq!(snapshot(&f64::NAN), Value::Null);
        assert_eq!(snapshot(&vec![1.0, f64::INFINITY]), json!([1.0, null]));
    }

    #[test]
    fn test_self_referential_graph_yields_sentinel() {
        let root = Rc::new(RefCell::new(Node { children: Vec::new() }));
        let child = Rc::new(RefCell::new(Node { children: vec![root.clone()] }));
        root.borrow_mut().children.push(child);

        assert!(is_sentinel(&snapshot(&NodeRef(root.clone()))));

        // Break the cycle so the test does not leak
        root.borrow_mut().children.clear();
    }

    #[test]
    fn test_depth_limit_boundary() {
        let mut at_limit = json!(0);
        for _ in 0..MAX_SNAPSHOT_DEPTH {
            at_limit = json!([at_limit]);
        }
        assert_eq!(snapshot(&at_limit), at_limit);

        let past_limit = json!([at_limit]);
        assert!(is_sentinel(&snapshot(&past_limit)));
    }

    #[test]
    fn test_snapshot_all_preserves_count_and_order() {
        let args = vec![json!("a"), json!(1), json!(null)];
        assert_eq!(snapshot_all(&args), args);
        assert!(snapshot_all::<Value>(&[]).is_empty());
    }
}
