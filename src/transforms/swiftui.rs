//! SwiftUI transforms: Color initialisers and CGFloat dimensions.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::{
    color::parse_color,
    errors::{DtifxError, Result},
    model::{TokenSnapshot, TokenType},
    transforms::{TokenSelector, TransformDefinition, TransformRegistry, validate_option_keys},
};

/// Register the SwiftUI built-ins.
pub fn register(registry: &mut TransformRegistry) {
    registry
        .register(
            "swiftui.color",
            Arc::new(|options| {
                validate_option_keys("swiftui.color", options, &[])?;
                Ok(Arc::new(SwiftUiColor) as Arc<dyn TransformDefinition>)
            }),
        )
        .expect("builtin registration cannot collide");
    registry
        .register(
            "swiftui.dimension",
            Arc::new(|options| {
                validate_option_keys("swiftui.dimension", options, &[])?;
                Ok(Arc::new(SwiftUiDimension) as Arc<dyn TransformDefinition>)
            }),
        )
        .expect("builtin registration cannot collide");
}

struct SwiftUiColor;

impl TransformDefinition for SwiftUiColor {
    fn name(&self) -> &str {
        "swiftui.color"
    }

    fn group(&self) -> &str {
        "swiftui"
    }

    fn selector(&self) -> TokenSelector {
        TokenSelector::for_type(TokenType::color())
    }

    fn apply(&self, snapshot: &TokenSnapshot) -> Result<Value> {
        let color = parse_color(snapshot.resolved_value()).ok_or_else(|| DtifxError::Transform {
            transform: self.name().into(),
            pointer: snapshot.pointer.to_string(),
            message: format!("not a colour value: {}", snapshot.resolution.value),
        })?;
        let rendered = format!(
            "Color(red: {:.4}, green: {:.4}, blue: {:.4}, opacity: {:.4})",
            color.r, color.g, color.b, color.a
        );
        Ok(json!({"value": rendered}))
    }
}

struct SwiftUiDimension;

impl TransformDefinition for SwiftUiDimension {
    fn name(&self) -> &str {
        "swiftui.dimension"
    }

    fn group(&self) -> &str {
        "swiftui"
    }

    fn selector(&self) -> TokenSelector {
        TokenSelector::for_type(TokenType::dimension())
    }

    fn apply(&self, snapshot: &TokenSnapshot) -> Result<Value> {
        let magnitude = dimension_magnitude(snapshot.resolved_value()).ok_or_else(|| {
            DtifxError::Transform {
                transform: self.name().into(),
                pointer: snapshot.pointer.to_string(),
                message: format!("not a dimension value: {}", snapshot.resolution.value),
            }
        })?;
        Ok(json!({"value": format!("CGFloat({magnitude})")}))
    }
}

/// Numeric magnitude of `"16px"`, `{value, unit}` or bare numbers.
fn dimension_magnitude(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => map.get("value").and_then(Value::as_f64),
        Value::String(text) => {
            let digits: String = text
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        config::NamedEntryConfig,
        model::TokenType,
        testutil::{sample_snapshot, snapshot_with_type},
        transforms::TransformRegistry,
    };

    fn prepare(name: &str) -> crate::transforms::PreparedTransform {
        TransformRegistry::with_builtins()
            .prepare(&[NamedEntryConfig {
                name: name.into(),
                options: None,
            }])
            .unwrap()
            .remove(0)
    }

    /// Colours render as Color initialisers with 0-1 channels.
    #[test]
    fn color_initialiser() {
        let transform = prepare("swiftui.color");
        let snapshot = sample_snapshot("#/color/primary", json!("#ff0000"));
        let output = transform.definition.apply(&snapshot).unwrap();
        assert_eq!(
            output["value"],
            "Color(red: 1.0000, green: 0.0000, blue: 0.0000, opacity: 1.0000)"
        );
    }

    /// Dimensions strip units into CGFloat magnitudes.
    #[test]
    fn dimension_magnitude() {
        let transform = prepare("swiftui.dimension");
        let snapshot = snapshot_with_type("#/size/m", TokenType::dimension(), json!("16px"));
        let output = transform.definition.apply(&snapshot).unwrap();
        assert_eq!(output["value"], "CGFloat(16)");
    }
}
