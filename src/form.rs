//! Form parser: form metadata, the UI definition, and the form module.
//!
//! Each form lives under `<object>/Forms/<FormName>/`: a metadata file
//! (`Forms/<FormName>.xml`, carrying the uuid), a UI definition
//! (`Ext/Form.xml`), and the form module (`Ext/Form/Module.bsl`). The UI
//! item tree is flattened into an arena of items carrying
//! (local_id, parent_local_id) pairs; the loader rebuilds the tree from
//! those, so no cyclic structures are built here.

use anyhow::{Context, Result};
use roxmltree::Node;
use std::path::Path;
use walkdir::WalkDir;

use crate::models::{
    DefaultForms, ParsedForm, ParsedFormAttribute, ParsedFormCommand, ParsedFormEvent,
    ParsedFormItem,
};
use crate::structural::classify_form_kind;
use crate::xml;

/// UI item tags the recursive descent recognizes. Anything else is skipped
/// (but its `ChildItems` are not descended into).
const ITEM_TYPES: [&str; 18] = [
    "Button",
    "ButtonGroup",
    "CheckBoxField",
    "ColumnGroup",
    "CommandBar",
    "InputField",
    "LabelDecoration",
    "LabelField",
    "Page",
    "Pages",
    "PictureDecoration",
    "PictureField",
    "Popup",
    "RadioButtonField",
    "SearchControl",
    "SearchStringAddition",
    "Table",
    "UsualGroup",
];

/// Scalar form properties copied into `properties_json`.
const PROPERTY_WHITELIST: [&str; 9] = [
    "Title",
    "Width",
    "Height",
    "WindowOpeningMode",
    "EnterKeyBehavior",
    "AutoTitle",
    "Enabled",
    "ReadOnly",
    "CommandBarLocation",
];

/// A form that could not be parsed; the ingestion run continues without it.
#[derive(Debug, Clone)]
pub struct FormSkip {
    pub form_name: String,
    pub reason: String,
}

/// Parses every form subdirectory under `<object_dir>/Forms`. Unreadable or
/// malformed forms are skipped and reported, never fatal.
pub fn parse_forms(object_dir: &Path, defaults: &DefaultForms) -> (Vec<ParsedForm>, Vec<FormSkip>) {
    let forms_dir = object_dir.join("Forms");
    let mut forms = Vec::new();
    let mut skipped = Vec::new();

    if !forms_dir.is_dir() {
        return (forms, skipped);
    }

    let mut form_dirs: Vec<_> = WalkDir::new(&forms_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();
    form_dirs.sort();

    for form_dir in form_dirs {
        let form_name = match form_dir.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        match parse_form_dir(&forms_dir, &form_dir, &form_name, defaults) {
            Ok(form) => forms.push(form),
            Err(err) => skipped.push(FormSkip {
                form_name,
                reason: format!("{err:#}"),
            }),
        }
    }

    (forms, skipped)
}

fn parse_form_dir(
    forms_dir: &Path,
    form_dir: &Path,
    form_name: &str,
    defaults: &DefaultForms,
) -> Result<ParsedForm> {
    let metadata_path = forms_dir.join(format!("{form_name}.xml"));
    let uuid = if metadata_path.is_file() {
        let text = xml::read_file(&metadata_path)?;
        form_uuid(&text).unwrap_or_default()
    } else {
        String::new()
    };

    let ui_path = form_dir.join("Ext").join("Form.xml");
    let ui_text = xml::read_file(&ui_path)?;
    let mut form = parse_form_ui(&ui_text).context("UI definition")?;

    form.name = form_name.to_string();
    form.uuid = uuid;
    form.kind = classify_form_kind(form_name, defaults);

    let module_path = form_dir.join("Ext").join("Form").join("Module.bsl");
    if module_path.is_file() {
        form.module_text = Some(xml::read_file(&module_path)?);
    }

    Ok(form)
}

/// Extracts the form uuid from the form metadata file.
fn form_uuid(text: &str) -> Option<String> {
    let doc = roxmltree::Document::parse(text).ok()?;
    doc.descendants()
        .find(|n| {
            n.is_element()
                && (n.tag_name().name() == "Form" || n.tag_name().name() == "MetaDataObject.Form")
                && n.attribute("uuid").is_some()
        })
        .and_then(|n| n.attribute("uuid"))
        .map(str::to_string)
}

/// Parses a form UI definition into its declared parts. Name, uuid, kind and
/// module text are filled in by the caller.
pub fn parse_form_ui(text: &str) -> Result<ParsedForm> {
    let doc = roxmltree::Document::parse(text).context("not valid XML")?;
    let root = doc.root_element();

    let mut properties = serde_json::Map::new();
    for prop in PROPERTY_WHITELIST {
        if let Some(node) = xml::child(root, prop) {
            let value = maybe_localized(node);
            if !value.is_empty() {
                properties.insert(prop.to_string(), serde_json::Value::String(value));
            }
        }
    }

    let events = parse_events(root);

    let attributes = xml::child(root, "Attributes")
        .map(|c| {
            xml::children(c, "Attribute")
                .into_iter()
                .map(parse_form_attribute)
                .collect()
        })
        .unwrap_or_default();

    let commands = xml::child(root, "Commands")
        .map(|c| {
            xml::children(c, "Command")
                .into_iter()
                .map(parse_form_command)
                .collect()
        })
        .unwrap_or_default();

    let mut items = Vec::new();
    let mut next_auto_id = 100_000i64;
    if let Some(child_items) = xml::child(root, "ChildItems") {
        collect_items(child_items, None, &mut items, &mut next_auto_id);
    }

    let conditional_appearance = xml::child(root, "ConditionalAppearance")
        .filter(|n| n.children().any(|c| c.is_element()))
        .map(|n| text[n.range()].to_string());

    Ok(ParsedForm {
        name: String::new(),
        uuid: String::new(),
        kind: None,
        properties,
        events,
        attributes,
        commands,
        items,
        conditional_appearance,
        module_text: None,
    })
}

/// Localized string when the node holds `item/content` structure, plain
/// trimmed text otherwise.
fn maybe_localized(node: Node) -> String {
    let localized = xml::localized_text(node);
    if localized.is_empty() {
        xml::text(node)
    } else {
        localized
    }
}

fn parse_events(node: Node) -> Vec<ParsedFormEvent> {
    xml::child(node, "Events")
        .map(|events| {
            xml::children(events, "Event")
                .into_iter()
                .map(|event| ParsedFormEvent {
                    event_name: event.attribute("name").unwrap_or_default().to_string(),
                    handler: xml::text(event),
                    call_type: event
                        .attribute("callType")
                        .map(str::to_string)
                        .or_else(|| xml::child_text(event, "CallType"))
                        .filter(|s| !s.is_empty()),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Functional-option usage markers on a form element: uuids or
/// `FunctionalOption.<name>` strings, resolved in pass 2.
fn fo_markers(node: Node) -> Vec<String> {
    xml::child(node, "FunctionalOptions")
        .map(|c| {
            c.children()
                .filter(|n| n.is_element())
                .map(xml::text)
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_form_attribute(node: Node) -> ParsedFormAttribute {
    let name = node
        .attribute("name")
        .map(str::to_string)
        .or_else(|| xml::child_text(node, "Name"))
        .unwrap_or_default();
    let query_text = node
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "QueryText")
        .map(xml::text)
        .filter(|t| !t.is_empty());
    let columns = xml::child(node, "Columns")
        .map(|cols| {
            xml::children(cols, "Column")
                .into_iter()
                .filter_map(|col| {
                    col.attribute("name")
                        .map(str::to_string)
                        .or_else(|| xml::child_text(col, "Name"))
                })
                .filter(|n| !n.is_empty())
                .collect()
        })
        .unwrap_or_default();

    ParsedFormAttribute {
        name,
        attr_type: xml::child(node, "Type")
            .map(xml::joined_type)
            .unwrap_or_default(),
        title: xml::child(node, "Title")
            .map(maybe_localized)
            .unwrap_or_default(),
        is_main: xml::child_text(node, "MainAttribute").as_deref() == Some("true"),
        query_text,
        columns,
        fo_markers: fo_markers(node),
    }
}

fn parse_form_command(node: Node) -> ParsedFormCommand {
    ParsedFormCommand {
        name: node.attribute("name").unwrap_or_default().to_string(),
        title: xml::child(node, "Title")
            .map(maybe_localized)
            .unwrap_or_default(),
        action: xml::child_text(node, "Action").unwrap_or_default(),
        shortcut: xml::child_text(node, "Shortcut").unwrap_or_default(),
        representation: xml::child_text(node, "Representation").unwrap_or_default(),
        fo_markers: fo_markers(node),
    }
}

/// Recursive descent over `ChildItems`, restricted to the item-type
/// whitelist. Items are appended in document order, so the flat arena's
/// insertion order is the stable traversal order.
fn collect_items(
    container: Node,
    parent_local_id: Option<i64>,
    items: &mut Vec<ParsedFormItem>,
    next_auto_id: &mut i64,
) {
    for node in container.children().filter(|n| n.is_element()) {
        let tag = node.tag_name().name();
        if !ITEM_TYPES.contains(&tag) {
            continue;
        }

        let local_id = match node.attribute("id").and_then(|v| v.parse().ok()) {
            Some(id) => id,
            None => {
                *next_auto_id += 1;
                *next_auto_id
            }
        };

        items.push(ParsedFormItem {
            local_id,
            parent_local_id,
            name: node.attribute("name").unwrap_or_default().to_string(),
            item_type: tag.to_string(),
            data_path: xml::child_text(node, "DataPath").unwrap_or_default(),
            title: xml::child(node, "Title")
                .map(maybe_localized)
                .unwrap_or_default(),
            visible: xml::tri_state(xml::child_text(node, "Visible")),
            enabled: xml::tri_state(xml::child_text(node, "Enabled")),
            events: parse_events(node),
            fo_markers: fo_markers(node),
        });

        if let Some(child_items) = xml::child(node, "ChildItems") {
            collect_items(child_items, Some(local_id), items, next_auto_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM_UI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Form xmlns="http://v8.1c.ru/8.3/xcf/logform">
  <Title><item><lang>ru</lang><content>Форма элемента</content></item></Title>
  <Width>60</Width>
  <Events>
    <Event name="OnOpen">ПриОткрытии</Event>
    <Event name="OnCreateAtServer" callType="Before">ПриСозданииНаСервере</Event>
  </Events>
  <Attributes>
    <Attribute name="Объект" id="1">
      <Type><Type>cfg:CatalogObject.Контрагенты</Type></Type>
      <MainAttribute>true</MainAttribute>
    </Attribute>
    <Attribute name="Список" id="2">
      <Type><Type>DynamicList</Type></Type>
      <Settings>
        <QueryText>ВЫБРАТЬ * ИЗ Справочник.Контрагенты</QueryText>
      </Settings>
      <Columns>
        <Column name="Наименование"/>
        <Column name="ИНН"/>
      </Columns>
    </Attribute>
  </Attributes>
  <Commands>
    <Command name="Записать">
      <Title><item><lang>ru</lang><content>Записать</content></item></Title>
      <Action>ЗаписатьКоманда</Action>
      <Shortcut>Ctrl+S</Shortcut>
      <FunctionalOptions><Item>FunctionalOption.ИспользоватьСкидки</Item></FunctionalOptions>
    </Command>
  </Commands>
  <ChildItems>
    <UsualGroup name="ГруппаШапка" id="10">
      <ChildItems>
        <InputField name="ПолеИНН" id="11">
          <DataPath>Объект.ИНН</DataPath>
          <Visible>false</Visible>
          <FunctionalOptions><Item>FunctionalOption.ИспользоватьСкидки</Item></FunctionalOptions>
          <Events>
            <Event name="OnChange">ИННПриИзменении</Event>
          </Events>
        </InputField>
      </ChildItems>
    </UsualGroup>
    <Button name="КнопкаЗаписать" id="20">
      <Enabled>true</Enabled>
    </Button>
    <UnknownWidget name="Прочее" id="30"/>
  </ChildItems>
  <ConditionalAppearance>
    <Item><Filter>X</Filter></Item>
  </ConditionalAppearance>
</Form>"#;

    #[test]
    fn parses_properties_events_attributes_commands() {
        let form = parse_form_ui(FORM_UI).unwrap();

        assert_eq!(
            form.properties.get("Title").and_then(|v| v.as_str()),
            Some("Форма элемента")
        );
        assert_eq!(
            form.properties.get("Width").and_then(|v| v.as_str()),
            Some("60")
        );

        assert_eq!(form.events.len(), 2);
        assert_eq!(form.events[0].event_name, "OnOpen");
        assert_eq!(form.events[0].handler, "ПриОткрытии");
        assert_eq!(form.events[1].call_type.as_deref(), Some("Before"));

        assert_eq!(form.attributes.len(), 2);
        assert!(form.attributes[0].is_main);
        let list = &form.attributes[1];
        assert_eq!(
            list.query_text.as_deref(),
            Some("ВЫБРАТЬ * ИЗ Справочник.Контрагенты")
        );
        assert_eq!(list.columns, vec!["Наименование", "ИНН"]);

        assert_eq!(form.commands.len(), 1);
        assert_eq!(form.commands[0].action, "ЗаписатьКоманда");
        assert_eq!(
            form.commands[0].fo_markers,
            vec!["FunctionalOption.ИспользоватьСкидки"]
        );
    }

    #[test]
    fn item_tree_is_a_flat_arena_with_parent_links() {
        let form = parse_form_ui(FORM_UI).unwrap();

        // UnknownWidget is not in the whitelist and must be absent.
        assert_eq!(form.items.len(), 3);

        let group = &form.items[0];
        assert_eq!(group.item_type, "UsualGroup");
        assert_eq!(group.local_id, 10);
        assert_eq!(group.parent_local_id, None);

        let field = &form.items[1];
        assert_eq!(field.item_type, "InputField");
        assert_eq!(field.parent_local_id, Some(10));
        assert_eq!(field.data_path, "Объект.ИНН");
        assert_eq!(field.visible, Some(false));
        assert_eq!(field.enabled, None);
        assert_eq!(field.events.len(), 1);
        assert_eq!(field.events[0].handler, "ИННПриИзменении");

        let button = &form.items[2];
        assert_eq!(button.parent_local_id, None);
        assert_eq!(button.enabled, Some(true));
        assert_eq!(button.visible, None);
    }

    #[test]
    fn conditional_appearance_is_kept_verbatim() {
        let form = parse_form_ui(FORM_UI).unwrap();
        let fragment = form.conditional_appearance.unwrap();
        assert!(fragment.contains("<Filter>X</Filter>"));
    }

    #[test]
    fn empty_form_parses() {
        let form = parse_form_ui("<Form/>").unwrap();
        assert!(form.items.is_empty());
        assert!(form.conditional_appearance.is_none());
    }
}
