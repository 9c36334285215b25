use serde::{Deserialize, Serialize};

use crate::error::{EnclavegenError, Result};
use super::analyzer::{RawParameter, RawShape};

/// A boundary-crossing parameter that passed marshalling validation
///
/// A fixed-size array parameter is carried as pointer-to-element-type plus the
/// verbatim extent expression, so `char img[1*112*112*3]` becomes `char*` with
/// `array_len` of `1*112*112*3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub type_name: String,
    pub name: String,
    pub array_len: Option<String>,
}

/// Validate one declared parameter for boundary-safety
///
/// Crossing the trust boundary requires a statically known extent for every
/// buffer, so pointer-shaped parameters are rejected outright.
pub fn shape(raw: &RawParameter) -> Result<ParameterDescriptor> {
    match &raw.shape {
        RawShape::Plain => Ok(ParameterDescriptor {
            type_name: raw.type_name.clone(),
            name: raw.name.clone(),
            array_len: None,
        }),
        RawShape::Array { extent } => Ok(ParameterDescriptor {
            type_name: format!("{}*", raw.type_name),
            name: raw.name.clone(),
            array_len: Some(extent.clone()),
        }),
        RawShape::Pointer => Err(EnclavegenError::Validation(format!(
            "parameter `{}` is pointer-typed; use a constant array (e.g. {} {}[32]) \
             instead of a pointer so the generated stubs know how many bytes to copy",
            raw.name, raw.type_name, raw.name,
        ))),
    }
}

/// Comma-joined `type name` list for plain signatures
pub fn render_params(params: &[ParameterDescriptor]) -> String {
    params
        .iter()
        .map(|p| format!("{} {}", p.type_name, p.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Comma-joined bare-name list for call forwarding
pub fn render_param_names(params: &[ParameterDescriptor]) -> String {
    params
        .iter()
        .map(|p| p.name.clone())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Comma-joined interface list; array-shaped parameters carry an explicit
/// in/out, fixed-size marshalling annotation
pub fn render_edl_params(params: &[ParameterDescriptor]) -> String {
    params
        .iter()
        .map(|p| match &p.array_len {
            Some(len) => format!("[in, out, size={}] {} {}", len, p.type_name, p.name),
            None => format!("{} {}", p.type_name, p.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(type_name: &str, name: &str, shape: RawShape) -> RawParameter {
        RawParameter {
            type_name: type_name.to_string(),
            name: name.to_string(),
            shape,
        }
    }

    #[test]
    fn test_plain_parameter_passes_through() {
        let desc = shape(&raw("int", "count", RawShape::Plain)).unwrap();
        assert_eq!(desc.type_name, "int");
        assert_eq!(desc.name, "count");
        assert_eq!(desc.array_len, None);
    }

    #[test]
    fn test_array_becomes_pointer_with_extent() {
        let desc = shape(&raw("char", "buf", RawShape::Array { extent: "64".into() })).unwrap();
        assert_eq!(desc.type_name, "char*");
        assert_eq!(desc.array_len.as_deref(), Some("64"));
    }

    #[test]
    fn test_pointer_rejected() {
        let err = shape(&raw("char", "p", RawShape::Pointer)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("pointer"));
        assert!(message.contains("`p`"));
    }

    #[test]
    fn test_array_shape_renders_three_ways() {
        let desc = shape(&raw("char", "name", RawShape::Array { extent: "64".into() })).unwrap();
        let params = vec![desc];

        assert_eq!(render_params(&params), "char* name");
        assert_eq!(render_param_names(&params), "name");
        assert_eq!(render_edl_params(&params), "[in, out, size=64] char* name");
    }

    #[test]
    fn test_extent_expression_kept_verbatim() {
        let img = shape(&raw("char", "img", RawShape::Array { extent: "1*112*112*3".into() })).unwrap();
        let res = shape(&raw("char", "res", RawShape::Array { extent: "328".into() })).unwrap();
        let params = vec![img, res];

        assert_eq!(
            render_edl_params(&params),
            "[in, out, size=1*112*112*3] char* img, [in, out, size=328] char* res"
        );
        assert_eq!(render_params(&params), "char* img, char* res");
        assert_eq!(render_param_names(&params), "img, res");
    }

    #[test]
    fn test_mixed_list_annotates_only_arrays() {
        let params = vec![
            shape(&raw("int", "n", RawShape::Plain)).unwrap(),
            shape(&raw("char", "buf", RawShape::Array { extent: "16".into() })).unwrap(),
        ];

        assert_eq!(render_edl_params(&params), "int n, [in, out, size=16] char* buf");
    }
}
