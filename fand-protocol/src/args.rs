//! Positional argument extraction
//!
//! Arity and JSON type mismatches are call errors; only the handler knows
//! the shape it expects.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use fand_error::{FandError, Result};

use crate::timestamp::parse_timestamp;
use crate::RequestKind;

pub fn expect_arity(kind: RequestKind, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(FandError::invalid_call(format!(
            "{kind} takes {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn arg<'a>(args: &'a [Value], index: usize) -> Result<&'a Value> {
    args.get(index)
        .ok_or_else(|| FandError::invalid_call(format!("missing argument {index}")))
}

pub fn arg_str(args: &[Value], index: usize) -> Result<&str> {
    arg(args, index)?
        .as_str()
        .ok_or_else(|| FandError::invalid_call(format!("argument {index} must be a string")))
}

pub fn arg_f64(args: &[Value], index: usize) -> Result<f64> {
    arg(args, index)?
        .as_f64()
        .ok_or_else(|| FandError::invalid_call(format!("argument {index} must be a number")))
}

pub fn arg_opt_f64(args: &[Value], index: usize) -> Result<Option<f64>> {
    match arg(args, index)? {
        Value::Null => Ok(None),
        _ => arg_f64(args, index).map(Some),
    }
}

/// Timestamp argument: RFC 3339 string or null
pub fn arg_opt_timestamp(args: &[Value], index: usize) -> Result<Option<DateTime<FixedOffset>>> {
    match arg(args, index)? {
        Value::Null => Ok(None),
        Value::String(s) => parse_timestamp(s).map(Some),
        _ => Err(FandError::invalid_call(format!(
            "argument {index} must be a timestamp string"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arity() {
        assert!(expect_arity(RequestKind::Ping, &[], 0).is_ok());
        let err = expect_arity(RequestKind::GetPwm, &[], 1).unwrap_err();
        assert!(matches!(err, FandError::InvalidCall(_)));
    }

    #[test]
    fn test_types() {
        let args = vec![json!("shelf-A"), json!(55), Value::Null, json!("abc")];
        assert_eq!(arg_str(&args, 0).unwrap(), "shelf-A");
        assert_eq!(arg_f64(&args, 1).unwrap(), 55.0);
        assert_eq!(arg_opt_f64(&args, 2).unwrap(), None);
        assert!(matches!(arg_f64(&args, 0), Err(FandError::InvalidCall(_))));
        assert!(matches!(arg_str(&args, 1), Err(FandError::InvalidCall(_))));
        assert!(matches!(arg_opt_f64(&args, 3), Err(FandError::InvalidCall(_))));
        assert!(matches!(arg_str(&args, 9), Err(FandError::InvalidCall(_))));
    }

    #[test]
    fn test_timestamp_arg() {
        let args = vec![json!("2030-01-02T03:04:05+02:00"), Value::Null, json!(12)];
        let ts = arg_opt_timestamp(&args, 0).unwrap().unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 7200);
        assert_eq!(arg_opt_timestamp(&args, 1).unwrap(), None);
        assert!(matches!(arg_opt_timestamp(&args, 2), Err(FandError::InvalidCall(_))));
    }
}
