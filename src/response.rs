//! `--json` output envelope: `{"ok": true, "data": ...}` or
//! `{"ok": false, "error": {"kind": ..., "message": ...}}`.

use serde::Serialize;

use crate::error::{CuadreError, ErrorKind, Result};

#[derive(Serialize)]
struct Success<'a, T: Serialize> {
    ok: bool,
    data: &'a T,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    message: String,
}

#[derive(Serialize)]
struct Failure {
    ok: bool,
    error: ErrorBody,
}

pub fn success<T: Serialize>(data: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(&Success { ok: true, data })?)
}

pub fn failure(err: &CuadreError) -> String {
    let body = Failure {
        ok: false,
        error: ErrorBody {
            kind: err.kind(),
            message: err.to_string(),
        },
    };
    serde_json::to_string_pretty(&body).unwrap_or_else(|_| {
        format!(r#"{{"ok": false, "error": {{"kind": "internal", "message": "{}"}}}}"#, err.to_string().replace('"', "'"))
    })
}

pub fn print_success<T: Serialize>(data: &T) -> Result<()> {
    println!("{}", success(data)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_success_envelope() {
        let out: Value = serde_json::from_str(&success(&json!({"n": 1})).unwrap()).unwrap();
        assert_eq!(out, json!({"ok": true, "data": {"n": 1}}));
    }

    #[test]
    fn test_failure_envelope_carries_kind() {
        let err = CuadreError::NotFound("import batch 3".into());
        let out: Value = serde_json::from_str(&failure(&err)).unwrap();
        assert_eq!(out["ok"], false);
        assert_eq!(out["error"]["kind"], "not_found");
        assert_eq!(out["error"]["message"], "Not found: import batch 3");

        let err = CuadreError::structure("costos", "missing column code/codigo");
        let out: Value = serde_json::from_str(&failure(&err)).unwrap();
        assert_eq!(out["error"]["kind"], "structure_mismatch");
    }
}
