//! Static description of the settings form the UI renders.
//!
//! The UI never hard-codes the field set; it walks this descriptor. Field and
//! group keys are the serialized settings keys, so a form value can be written
//! straight back into [`Settings`].

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::frames::LogLevel;
use crate::settings::{Settings, LOCALES, PORT_MAX, PORT_MIN, THEMES};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    Number {
        minimum: f64,
        maximum: f64,
        step: f64,
        default_value: f64,
    },
    Checkbox {
        default_value: bool,
    },
    Select {
        choices: Vec<String>,
        default_value: String,
    },
    Text {
        #[serde(skip_serializing_if = "Option::is_none")]
        regex: Option<String>,
        default_value: String,
    },
}

impl Constraint {
    pub fn number(minimum: f64, maximum: f64, default_value: f64) -> Self {
        Constraint::Number {
            minimum,
            maximum,
            step: 1.0,
            default_value,
        }
    }

    pub fn checkbox(default_value: bool) -> Self {
        Constraint::Checkbox { default_value }
    }

    pub fn select<I, S>(choices: I, default_value: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Constraint::Select {
            choices: choices.into_iter().map(Into::into).collect(),
            default_value: default_value.into(),
        }
    }

    pub fn text(default_value: impl Into<String>) -> Self {
        Constraint::Text {
            regex: None,
            default_value: default_value.into(),
        }
    }

    pub fn text_matching(regex: &str, default_value: impl Into<String>) -> Self {
        Constraint::Text {
            regex: Some(regex.to_string()),
            default_value: default_value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldForm {
    pub key: &'static str,
    pub label: &'static str,
    pub constraint: Constraint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupForm {
    pub key: &'static str,
    pub label: &'static str,
    /// Fields in display order.
    pub fields: Vec<FieldForm>,
}

impl GroupForm {
    fn new(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            fields: Vec::new(),
        }
    }

    fn field(mut self, key: &'static str, label: &'static str, constraint: Constraint) -> Self {
        self.fields.push(FieldForm {
            key,
            label,
            constraint,
        });
        self
    }

    pub fn order(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.key).collect()
    }

    pub fn get(&self, key: &str) -> Option<&FieldForm> {
        self.fields.iter().find(|f| f.key == key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormDescriptor {
    /// Groups in display order.
    pub groups: Vec<GroupForm>,
}

impl FormDescriptor {
    pub fn group(&self, key: &str) -> Option<&GroupForm> {
        self.groups.iter().find(|g| g.key == key)
    }

    pub fn order(&self) -> Vec<&'static str> {
        self.groups.iter().map(|g| g.key).collect()
    }
}

struct LabeledConstraint<'a>(&'a FieldForm);

impl Serialize for LabeledConstraint<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut value = serde_json::to_value(&self.0.constraint).map_err(serde::ser::Error::custom)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("label".into(), self.0.label.into());
        }
        value.serialize(serializer)
    }
}

impl Serialize for GroupForm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 2))?;
        for field in &self.fields {
            map.serialize_entry(field.key, &LabeledConstraint(field))?;
        }
        map.serialize_entry("Label", self.label)?;
        map.serialize_entry("Order", &self.order())?;
        map.end()
    }
}

impl Serialize for FormDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len() + 1))?;
        for group in &self.groups {
            map.serialize_entry(group.key, group)?;
        }
        map.serialize_entry("Order", &self.order())?;
        map.end()
    }
}

/// Build the descriptor for [`Settings`], with defaults taken from
/// `Settings::default()` so the two cannot drift.
pub fn general_settings_form() -> FormDescriptor {
    let d = Settings::default();
    let port_min = f64::from(PORT_MIN);
    let port_max = f64::from(PORT_MAX);
    let levels = LogLevel::SELECTABLE.iter().map(|l| l.as_str());

    FormDescriptor {
        groups: vec![
            GroupForm::new("Device", "Device")
                .field("ID", "Device ID", Constraint::text(d.device.id.clone()))
                .field(
                    "Streaming",
                    "Device Streaming (disable for slow PCs)",
                    Constraint::checkbox(d.device.streaming),
                )
                .field(
                    "HardwareDecoding",
                    "Enable Hardware Decoding",
                    Constraint::checkbox(d.device.hardware_decoding),
                )
                .field(
                    "ResizeDisplay",
                    "Resize Display (Phone/Tablet only)",
                    Constraint::checkbox(d.device.resize_display),
                ),
            GroupForm::new("Update", "Update")
                .field(
                    "AutoUpdate",
                    "Automatically download updates",
                    Constraint::checkbox(d.update.auto_update),
                )
                .field(
                    "EnableAlphaUpdates",
                    "Download Alpha updates",
                    Constraint::checkbox(d.update.enable_alpha_updates),
                ),
            GroupForm::new("UI", "User Interface")
                .field("Theme", "Theme", Constraint::select(THEMES.iter().copied(), d.ui.theme.clone()))
                .field(
                    "Locale",
                    "Language",
                    Constraint::select(LOCALES.iter().copied(), d.ui.locale.clone()),
                )
                .field(
                    "NotificationsEnabled",
                    "Enable Notifications",
                    Constraint::checkbox(d.ui.notifications_enabled),
                )
                .field(
                    "CloseShouldMinimize",
                    "Close button should minimize the window",
                    Constraint::checkbox(d.ui.close_should_minimize),
                ),
            GroupForm::new("Logging", "Logging")
                .field(
                    "Level",
                    "Log Level",
                    Constraint::select(levels, d.logging.level.as_str()),
                )
                .field(
                    "DebugScreenshotLimit",
                    "Debug Screenshot Limit",
                    Constraint::number(0.0, 999.0, f64::from(d.logging.debug_screenshot_limit)),
                )
                .field(
                    "TaskLogLimit",
                    "Task Log Limit",
                    Constraint::number(0.0, 999.0, f64::from(d.logging.task_log_limit)),
                ),
            GroupForm::new("Advanced", "Advanced")
                .field(
                    "ADBHost",
                    "ADB Server Host",
                    Constraint::text(d.advanced.adb_host.clone()),
                )
                .field(
                    "ADBPort",
                    "ADB Server Port",
                    Constraint::number(port_min, port_max, f64::from(d.advanced.adb_port)),
                )
                .field(
                    "AutoPlayerHost",
                    "AutoPlayer Host",
                    Constraint::text_matching(
                        r"^[A-Za-z0-9.\-]+$",
                        d.advanced.auto_player_host.clone(),
                    ),
                )
                .field(
                    "AutoPlayerPort",
                    "AutoPlayer Port",
                    Constraint::number(port_min, port_max, f64::from(d.advanced.auto_player_port)),
                )
                .field(
                    "StreamingFPS",
                    "Streaming FPS",
                    Constraint::number(1.0, 120.0, f64::from(d.advanced.streaming_fps)),
                ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn every_settings_field_is_described() {
        let form = general_settings_form();
        let settings = serde_json::to_value(Settings::default()).expect("settings json");
        let groups = settings.as_object().expect("object");
        assert_eq!(groups.len(), form.groups.len());
        for (group_key, fields) in groups {
            let group = form
                .group(group_key)
                .unwrap_or_else(|| panic!("group {group_key} missing from form"));
            let fields = fields.as_object().expect("group object");
            assert_eq!(fields.len(), group.fields.len(), "group {group_key}");
            for field_key in fields.keys() {
                assert!(group.get(field_key).is_some(), "{group_key}.{field_key} missing");
            }
        }
    }

    #[test]
    fn order_lists_reference_existing_entries() {
        let json = serde_json::to_value(general_settings_form()).expect("form json");
        let top = json.as_object().expect("object");
        let order = top["Order"].as_array().expect("order");
        assert_eq!(order.len(), top.len() - 1);
        for group in order {
            let group = group.as_str().expect("str");
            let entry = top[group].as_object().expect("group");
            for field in entry["Order"].as_array().expect("field order") {
                let field = field.as_str().expect("str");
                assert!(entry.contains_key(field), "{group}.{field}");
                assert!(entry[field].get("type").is_some());
            }
        }
    }

    #[test]
    fn defaults_match_settings_defaults() {
        let form = general_settings_form();
        let port = &form.group("Advanced").unwrap().get("AutoPlayerPort").unwrap().constraint;
        assert_eq!(
            port,
            &Constraint::Number {
                minimum: 1024.0,
                maximum: 65535.0,
                step: 1.0,
                default_value: 62121.0
            }
        );
        let json = serde_json::to_value(&form).unwrap();
        assert_eq!(json["Logging"]["Level"]["type"], "select");
        assert_eq!(json["Logging"]["Level"]["default_value"], "INFO");
        assert_eq!(json["Logging"]["Level"]["choices"].as_array().unwrap().len(), 5);
        assert_eq!(json["UI"]["Theme"]["label"], "Theme");
        assert!(matches!(json["Device"]["ID"].get("regex"), None | Some(Value::Null)));
    }
}
