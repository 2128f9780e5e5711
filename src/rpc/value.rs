//! Typed XML-RPC value tree.
//!
//! The envelope listing call used to be handled as an untyped object graph
//! validated by casts; here the wire payload is decoded once into this tree
//! and everything downstream works with typed values.

/// One XML-RPC value.
///
/// Struct members keep their wire order, which is what lets the listing
/// transform preserve the order schemas appear in the response.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    Nil,
    Bool(bool),
    Int(i32),
    Double(f64),
    String(String),
    Array(Vec<RpcValue>),
    Struct(Vec<(String, RpcValue)>),
}

impl RpcValue {
    /// Member lookup for struct values; `None` for any other variant.
    pub fn get(&self, name: &str) -> Option<&RpcValue> {
        match self {
            RpcValue::Struct(members) => members
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RpcValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            RpcValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RpcValue]> {
        match self {
            RpcValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, RpcValue::Nil)
    }
}

impl From<&str> for RpcValue {
    fn from(s: &str) -> Self {
        RpcValue::String(s.to_string())
    }
}

impl From<String> for RpcValue {
    fn from(s: String) -> Self {
        RpcValue::String(s)
    }
}

impl From<i32> for RpcValue {
    fn from(i: i32) -> Self {
        RpcValue::Int(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_lookup_preserves_first_match() {
        let value = RpcValue::Struct(vec![
            ("a".into(), RpcValue::Int(1)),
            ("b".into(), RpcValue::Int(2)),
        ]);
        assert_eq!(value.get("b").and_then(RpcValue::as_i32), Some(2));
        assert!(value.get("missing").is_none());
        assert!(RpcValue::Nil.get("a").is_none());
    }
}
