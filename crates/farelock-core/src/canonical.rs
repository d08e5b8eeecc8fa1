//! Deterministic byte serialization of ticket claim maps.
//!
//! Every hash and signature in the system is computed over the output of
//! [`canonicalize`], so two independent implementations handed the same
//! logical claim map must produce byte-identical output. Object keys are
//! written in lexicographic byte order at every nesting level, no
//! insignificant whitespace is emitted, and numbers are formatted
//! platform-independently.

use serde_json::Value;

use crate::error::CanonicalError;

/// Maximum nesting depth accepted for claim maps.
///
/// Claim maps are flat-enough structures of strings, numbers, booleans,
/// nested maps, and lists. Anything deeper than this is rejected rather
/// than risking stack exhaustion on adversarial input.
const MAX_DEPTH: usize = 32;

/// Serializes a claim map into canonical UTF-8 JSON bytes.
///
/// The root value must be a JSON object. Keys are sorted lexicographically
/// by UTF-8 byte order at every level, integers serialize as decimal
/// literals, and finite floats use Rust's shortest round-trip formatting
/// (deterministic across platforms). Non-finite numbers and over-deep
/// nesting fail with [`CanonicalError`].
pub fn canonicalize(claims: &Value) -> Result<Vec<u8>, CanonicalError> {
    if !claims.is_object() {
        return Err(CanonicalError::NotAnObject);
    }

    let mut out = Vec::with_capacity(256);
    write_value(claims, &mut out, 0)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut Vec<u8>, depth: usize) -> Result<(), CanonicalError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalError::DepthExceeded { max: MAX_DEPTH });
    }

    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out, depth + 1)?;
            }
            out.push(b']');
        },
        Value::Object(map) => {
            // serde_json preserves insertion order; canonical form requires
            // lexicographic key order regardless of how the map was built.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();

            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(key, out);
                out.push(b':');
                write_value(&map[key.as_str()], out, depth + 1)?;
            }
            out.push(b'}');
        },
    }

    Ok(())
}

fn write_number(n: &serde_json::Number, out: &mut Vec<u8>) -> Result<(), CanonicalError> {
    if let Some(i) = n.as_i64() {
        out.extend_from_slice(i.to_string().as_bytes());
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        out.extend_from_slice(u.to_string().as_bytes());
        return Ok(());
    }

    let f = n.as_f64().ok_or(CanonicalError::NonFiniteNumber)?;
    if !f.is_finite() {
        return Err(CanonicalError::NonFiniteNumber);
    }

    // Shortest round-trip decimal form. Rust guarantees this is the same on
    // every platform, unlike locale-dependent printf-style formatting.
    out.extend_from_slice(format!("{f}").as_bytes());
    Ok(())
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            },
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            },
        }
    }
    out.push(b'"');
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn keys_sorted_at_every_level() {
        let claims = json!({
            "zeta": {"b": 1, "a": 2},
            "alpha": [1, 2, 3],
        });

        let bytes = canonicalize(&claims).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"alpha":[1,2,3],"zeta":{"a":2,"b":1}}"#
        );
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let a = serde_json::from_str::<Value>(r#"{"x": 1, "y": 2, "z": {"q": true, "p": null}}"#)
            .unwrap();
        let b = serde_json::from_str::<Value>(r#"{"z": {"p": null, "q": true}, "y": 2, "x": 1}"#)
            .unwrap();

        assert_eq!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
    }

    #[test]
    fn no_insignificant_whitespace() {
        let claims = json!({"route": "A-B", "seats": [12, 14]});
        let bytes = canonicalize(&claims).unwrap();

        assert!(!bytes.contains(&b' '), "canonical form must not contain spaces");
    }

    #[test]
    fn integers_stay_integers() {
        let claims = json!({"fare": 1250, "negative": -3});
        let bytes = canonicalize(&claims).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"fare":1250,"negative":-3}"#);
    }

    #[test]
    fn floats_use_shortest_round_trip_form() {
        let claims = json!({"price": 12.5});
        let bytes = canonicalize(&claims).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"price":12.5}"#);
    }

    #[test]
    fn rejects_non_object_root() {
        assert!(matches!(
            canonicalize(&json!([1, 2, 3])),
            Err(CanonicalError::NotAnObject)
        ));
        assert!(matches!(canonicalize(&json!("claims")), Err(CanonicalError::NotAnObject)));
    }

    #[test]
    fn rejects_over_deep_nesting() {
        let mut value = json!({"leaf": true});
        for _ in 0..40 {
            value = json!({ "nested": value });
        }

        assert!(matches!(
            canonicalize(&value),
            Err(CanonicalError::DepthExceeded { .. })
        ));
    }

    #[test]
    fn escapes_control_characters_and_quotes() {
        let claims = json!({"note": "line1\nline2 \"quoted\" \u{0001}"});
        let bytes = canonicalize(&claims).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"note":"line1\nline2 \"quoted\" \u0001"}"#
        );
    }

    #[test]
    fn canonicalize_is_deterministic() {
        let claims = json!({
            "subject": "rider-42",
            "route": {"from": "central", "to": "harbor"},
            "price": 4.2,
        });

        assert_eq!(canonicalize(&claims).unwrap(), canonicalize(&claims).unwrap());
    }

    mod properties {
        use proptest::prelude::*;

        use super::super::*;

        fn render(pairs: &[(&String, &i64)]) -> String {
            let body = pairs
                .iter()
                .map(|(key, value)| format!("\"{key}\":{value}"))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }

        proptest! {
            #[test]
            fn key_insertion_order_never_changes_the_bytes(
                entries in proptest::collection::hash_map("[a-z]{1,8}", any::<i64>(), 1..8),
            ) {
                let mut pairs: Vec<_> = entries.iter().collect();
                pairs.sort();
                let forward: Value = serde_json::from_str(&render(&pairs)).unwrap();
                pairs.reverse();
                let backward: Value = serde_json::from_str(&render(&pairs)).unwrap();

                prop_assert_eq!(
                    canonicalize(&forward).unwrap(),
                    canonicalize(&backward).unwrap()
                );
            }
        }
    }
}
