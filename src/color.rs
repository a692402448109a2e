//! Colour parsing and contrast math shared by the platform transforms and
//! the WCAG contrast policy.

use serde_json::Value;

/// A parsed colour with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    /// Lowercase `#rrggbb` form, dropping alpha.
    pub fn to_hex(&self) -> String {
        format!(
            "#{:02x}{:02x}{:02x}",
            channel_byte(self.r),
            channel_byte(self.g),
            channel_byte(self.b)
        )
    }

    /// Android `#AARRGGBB` form.
    pub fn to_argb_hex(&self) -> String {
        format!(
            "#{:02X}{:02X}{:02X}{:02X}",
            channel_byte(self.a),
            channel_byte(self.r),
            channel_byte(self.g),
            channel_byte(self.b)
        )
    }

    /// WCAG 2.x relative luminance.
    pub fn relative_luminance(&self) -> f64 {
        fn linearise(channel: f64) -> f64 {
            if channel <= 0.04045 {
                channel / 12.92
            } else {
                ((channel + 0.055) / 1.055).powf(2.4)
            }
        }
        0.2126 * linearise(self.r) + 0.7152 * linearise(self.g) + 0.0722 * linearise(self.b)
    }
}

fn channel_byte(channel: f64) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// WCAG contrast ratio between two colours, in `1.0..=21.0`.
pub fn contrast_ratio(foreground: &Rgba, background: &Rgba) -> f64 {
    let lf = foreground.relative_luminance();
    let lb = background.relative_luminance();
    let (lighter, darker) = if lf >= lb { (lf, lb) } else { (lb, lf) };
    (lighter + 0.05) / (darker + 0.05)
}

/// Parse a token value into a colour.
///
/// Accepts `#rgb`, `#rrggbb`, `#rrggbbaa` hex strings, `rgb(r, g, b)` /
/// `rgba(r, g, b, a)` strings with 0-255 channels, and object form
/// `{"colorSpace": "srgb", "components": [r, g, b], "alpha"?}` with 0-1
/// channels.
pub fn parse_color(value: &Value) -> Option<Rgba> {
    match value {
        Value::String(text) => parse_color_str(text),
        Value::Object(map) => {
            let components = map.get("components")?.as_array()?;
            if components.len() < 3 {
                return None;
            }
            let channel = |idx: usize| components.get(idx).and_then(Value::as_f64);
            Some(Rgba {
                r: channel(0)?,
                g: channel(1)?,
                b: channel(2)?,
                a: map.get("alpha").and_then(Value::as_f64).unwrap_or(1.0),
            })
        }
        _ => None,
    }
}

fn parse_color_str(text: &str) -> Option<Rgba> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = text.to_ascii_lowercase();
    if lower.starts_with("rgb(") || lower.starts_with("rgba(") {
        let inner = text[text.find('(')? + 1..].strip_suffix(')')?;
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        if parts.len() < 3 {
            return None;
        }
        let channel = |idx: usize| -> Option<f64> {
            parts.get(idx)?.parse::<f64>().ok().map(|v| v / 255.0)
        };
        return Some(Rgba {
            r: channel(0)?,
            g: channel(1)?,
            b: channel(2)?,
            a: parts
                .get(3)
                .and_then(|raw| raw.parse::<f64>().ok())
                .unwrap_or(1.0),
        });
    }
    None
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    let byte = |pair: &str| u8::from_str_radix(pair, 16).ok().map(|v| v as f64 / 255.0);
    match hex.len() {
        3 => {
            let expand = |idx: usize| {
                let c = &hex[idx..idx + 1];
                byte(&format!("{c}{c}"))
            };
            Some(Rgba {
                r: expand(0)?,
                g: expand(1)?,
                b: expand(2)?,
                a: 1.0,
            })
        }
        6 | 8 => Some(Rgba {
            r: byte(&hex[0..2])?,
            g: byte(&hex[2..4])?,
            b: byte(&hex[4..6])?,
            a: if hex.len() == 8 { byte(&hex[6..8])? } else { 1.0 },
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{contrast_ratio, parse_color};

    /// Hex forms in all three lengths parse to the same colour.
    #[test]
    fn parses_hex_forms() {
        let short = parse_color(&json!("#f00")).unwrap();
        let long = parse_color(&json!("#ff0000")).unwrap();
        let alpha = parse_color(&json!("#ff000080")).unwrap();
        assert_eq!(short.to_hex(), "#ff0000");
        assert_eq!(long.to_hex(), "#ff0000");
        assert!((alpha.a - 128.0 / 255.0).abs() < 1e-6);
    }

    /// rgb() channel values are 0-255.
    #[test]
    fn parses_rgb_function() {
        let color = parse_color(&json!("rgb(0, 128, 255)")).unwrap();
        assert!((color.g - 128.0 / 255.0).abs() < 1e-6);
        assert!((color.b - 1.0).abs() < 1e-6);
    }

    /// Object form uses 0-1 components.
    #[test]
    fn parses_object_form() {
        let color = parse_color(&json!({
            "colorSpace": "srgb",
            "components": [0.1, 0.2, 0.3],
            "alpha": 0.5
        }))
        .unwrap();
        assert!((color.r - 0.1).abs() < 1e-6);
        assert!((color.a - 0.5).abs() < 1e-6);
    }

    /// Black on white is the canonical 21:1 ratio.
    #[test]
    fn contrast_black_on_white() {
        let black = parse_color(&json!("#000000")).unwrap();
        let white = parse_color(&json!("#ffffff")).unwrap();
        let ratio = contrast_ratio(&black, &white);
        assert!((ratio - 21.0).abs() < 0.01, "ratio was {ratio}");
        // Symmetric.
        assert_eq!(ratio, contrast_ratio(&white, &black));
    }

    /// Non-colour values parse to None.
    #[test]
    fn rejects_non_colors() {
        assert!(parse_color(&json!("16px")).is_none());
        assert!(parse_color(&json!(12)).is_none());
        assert!(parse_color(&json!("#12")).is_none());
    }
}
