//! Per-method parameter validation.
//!
//! Handlers pull typed, normalized values out of the raw params object
//! through these helpers; a failure produces the structured `InvalidParams`
//! reply (offending field + suggestion) and the handler body never runs on
//! bad input.  Device identifiers are accepted in external form only and
//! resolved through the mapper; filenames are restricted to plain basenames;
//! pagination is bounded.

use crate::mapper::{CameraIdMapper, parse_external_id};
use crate::methods::response;
use cam_protocol::RpcError;
use serde_json::{Map, Value};

/// Largest page a catalog listing will return.
pub const MAX_PAGE_LIMIT: usize = 200;
/// Default page size when `limit` is absent.
pub const DEFAULT_PAGE_LIMIT: usize = 50;
/// Largest accepted `offset`.
pub const MAX_PAGE_OFFSET: usize = 10_000;

/// A device reference resolved at the boundary: external id plus the
/// internal path handlers address the hardware by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    pub external_id: String,
    pub device_path: String,
}

/// Required string field.
pub fn require_str<'a>(params: &'a Map<String, Value>, field: &str) -> Result<&'a str, RpcError> {
    match params.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(response::invalid_params(
            field,
            "must be a string",
            format!("pass {field} as a JSON string"),
        )),
        None => Err(response::invalid_params(
            field,
            "is required",
            format!("include the {field} field"),
        )),
    }
}

/// Optional string field; `None` when absent.
pub fn optional_str<'a>(
    params: &'a Map<String, Value>,
    field: &str,
) -> Result<Option<&'a str>, RpcError> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(response::invalid_params(
            field,
            "must be a string",
            format!("pass {field} as a JSON string"),
        )),
    }
}

/// Optional non-negative integer field.
pub fn optional_u64(params: &Map<String, Value>, field: &str) -> Result<Option<u64>, RpcError> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            response::invalid_params(
                field,
                "must be a non-negative integer",
                format!("pass {field} as a JSON number >= 0"),
            )
        }),
    }
}

/// Validate a device field: external form, canonical, currently mapped.
pub fn validate_device(
    params: &Map<String, Value>,
    field: &str,
    mapper: &CameraIdMapper,
) -> Result<DeviceRef, RpcError> {
    let raw = require_str(params, field)?;
    if parse_external_id(raw).is_none() {
        return Err(response::invalid_params(
            field,
            format!("'{raw}' is not a camera identifier"),
            "use the external form, e.g. camera0",
        ));
    }
    let device_path = mapper
        .path_for(raw)
        .ok_or_else(|| response::camera_not_found(raw))?;
    Ok(DeviceRef {
        external_id: raw.to_owned(),
        device_path,
    })
}

/// Validate a filename: a plain basename, no traversal, no separators.
pub fn validate_filename(params: &Map<String, Value>, field: &str) -> Result<String, RpcError> {
    let raw = require_str(params, field)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(response::invalid_params(
            field,
            "must not be empty",
            "pass the file's basename",
        ));
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed.contains('\0') {
        return Err(response::invalid_params(
            field,
            "must not contain path separators",
            "pass the file's basename without directories",
        ));
    }
    if trimmed == "." || trimmed == ".." || trimmed.starts_with('.') {
        return Err(response::invalid_params(
            field,
            "must not be a dot path",
            "pass a plain file name",
        ));
    }
    Ok(trimmed.to_owned())
}

/// Validate pagination fields, applying defaults and caps.
pub fn validate_pagination(params: &Map<String, Value>) -> Result<(usize, usize), RpcError> {
    let limit = match optional_u64(params, "limit")? {
        None => DEFAULT_PAGE_LIMIT,
        Some(0) => {
            return Err(response::invalid_params(
                "limit",
                "must be at least 1",
                format!("use a limit between 1 and {MAX_PAGE_LIMIT}"),
            ));
        }
        Some(n) if n > MAX_PAGE_LIMIT as u64 => {
            return Err(response::invalid_params(
                "limit",
                format!("must not exceed {MAX_PAGE_LIMIT}"),
                format!("use a limit between 1 and {MAX_PAGE_LIMIT}"),
            ));
        }
        Some(n) => n as usize,
    };
    let offset = match optional_u64(params, "offset")? {
        None => 0,
        Some(n) if n > MAX_PAGE_OFFSET as u64 => {
            return Err(response::invalid_params(
                "offset",
                format!("must not exceed {MAX_PAGE_OFFSET}"),
                "page through results with smaller offsets",
            ));
        }
        Some(n) => n as usize,
    };
    Ok((limit, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().expect("object").clone()
    }

    fn mapper_with_camera0() -> CameraIdMapper {
        let mapper = CameraIdMapper::new();
        mapper.device_added("/dev/video0");
        mapper
    }

    #[test]
    fn device_in_external_form_resolves_to_its_path() {
        let mapper = mapper_with_camera0();
        let device = validate_device(&params(json!({"device": "camera0"})), "device", &mapper)
            .expect("valid device");
        assert_eq!(device.external_id, "camera0");
        assert_eq!(device.device_path, "/dev/video0");
    }

    #[test]
    fn internal_paths_and_bad_forms_are_rejected_as_invalid_params() {
        let mapper = mapper_with_camera0();
        for bad in ["/dev/video0", "cam0", "camera01", ""] {
            let err = validate_device(&params(json!({"device": bad})), "device", &mapper)
                .expect_err("should fail");
            assert_eq!(err.code, cam_protocol::error_codes::INVALID_PARAMS, "{bad}");
        }
    }

    #[test]
    fn unmapped_camera_is_a_not_found_error() {
        let mapper = mapper_with_camera0();
        let err = validate_device(&params(json!({"device": "camera7"})), "device", &mapper)
            .expect_err("should fail");
        assert_eq!(err.code, cam_protocol::error_codes::CAMERA_NOT_FOUND);
    }

    #[test]
    fn missing_device_field_names_the_field() {
        let mapper = mapper_with_camera0();
        let err =
            validate_device(&params(json!({})), "device", &mapper).expect_err("should fail");
        let data = err.data.expect("structured data");
        assert!(data.details.starts_with("device:"));
    }

    #[test]
    fn filenames_reject_traversal_and_separators() {
        for bad in ["", "  ", "../etc/passwd", "a/b.mp4", "a\\b.mp4", ".hidden", ".."] {
            assert!(
                validate_filename(&params(json!({"filename": bad})), "filename").is_err(),
                "{bad:?} should be rejected"
            );
        }
        assert_eq!(
            validate_filename(&params(json!({"filename": " clip.mp4 "})), "filename").unwrap(),
            "clip.mp4"
        );
    }

    #[test]
    fn pagination_defaults_and_caps() {
        assert_eq!(validate_pagination(&params(json!({}))).unwrap(), (50, 0));
        assert_eq!(
            validate_pagination(&params(json!({"limit": 10, "offset": 20}))).unwrap(),
            (10, 20)
        );
        assert!(validate_pagination(&params(json!({"limit": 0}))).is_err());
        assert!(validate_pagination(&params(json!({"limit": 201}))).is_err());
        assert!(validate_pagination(&params(json!({"offset": 10_001}))).is_err());
        assert!(validate_pagination(&params(json!({"limit": -1}))).is_err());
    }
}
