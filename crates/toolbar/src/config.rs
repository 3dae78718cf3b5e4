use manos_plate_core::HeadingTag;
use serde::{Deserialize, Serialize};

use crate::ToolbarError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolbarConfig {
    /// Gap between the bottom of the selection and the floating editor.
    pub vertical_offset: f32,
    /// Class of the floating editor's URL input. While it has focus the
    /// overlay is never hidden.
    pub link_input_class: String,
    pub heading_buttons: Vec<HeadingTag>,
}

impl Default for ToolbarConfig {
    fn default() -> Self {
        Self {
            vertical_offset: 10.0,
            link_input_class: "link-input".to_string(),
            heading_buttons: vec![HeadingTag::H1, HeadingTag::H2, HeadingTag::H3],
        }
    }
}

impl ToolbarConfig {
    pub fn from_json(json: &str) -> Result<Self, ToolbarError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = ToolbarConfig::from_json(r#"{ "vertical_offset": 4 }"#).unwrap();
        assert_eq!(config.vertical_offset, 4.0);
        assert_eq!(config.link_input_class, "link-input");
        assert_eq!(config.heading_buttons.len(), 3);
    }

    #[test]
    fn heading_buttons_parse_from_tags() {
        let config = ToolbarConfig::from_json(r#"{ "heading_buttons": ["h4", "h6"] }"#).unwrap();
        assert_eq!(config.heading_buttons, vec![HeadingTag::H4, HeadingTag::H6]);
        assert!(ToolbarConfig::from_json(r#"{ "heading_buttons": ["h7"] }"#).is_err());
    }
}
