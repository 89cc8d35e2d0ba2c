//! Structural parser for per-object metadata files.
//!
//! Two incompatible generations of the export schema are in the wild. The
//! older one wraps repeating children in container elements
//! (`Attributes/Attribute`, `TabularSections/TabularSection`); the newer one
//! lists them flat under a single `ChildObjects` element. The dialect is
//! probed once per object and every extraction helper dispatches on it, so
//! no helper carries its own probe.
//!
//! Extension exports additionally alias the object tag as
//! `MetaDataObject.<Type>` and carry `ObjectBelonging` /
//! `ExtendedConfigurationObject` properties.

use anyhow::{bail, Context, Result};
use roxmltree::Node;

use crate::models::{
    AttributeSection, Belonging, DefaultForms, FormKind, ObjectType, ParsedAttribute,
    ParsedEnumValue, ParsedFunctionalOption, ParsedObject, ParsedTabularColumn,
    ParsedTabularSection,
};
use crate::xml;

/// Which of the two export schema generations an object file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Container elements per child kind: `Attributes/Attribute`, ...
    Wrapped,
    /// Flat children of a single `ChildObjects` element.
    Flat,
}

impl Dialect {
    /// Probes the object element once; helpers dispatch on the result.
    pub fn probe(object_el: Node) -> Dialect {
        const CONTAINERS: [&str; 6] = [
            "Attributes",
            "Dimensions",
            "Resources",
            "TabularSections",
            "EnumValues",
            "Forms",
        ];
        if CONTAINERS
            .iter()
            .any(|c| xml::child(object_el, c).is_some())
        {
            Dialect::Wrapped
        } else {
            Dialect::Flat
        }
    }
}

/// Child elements of one kind, independent of dialect. `tag` is the
/// per-element tag (`Attribute`), `container` its wrapped-dialect parent
/// (`Attributes`).
fn sub_elements<'a, 'input>(
    object_el: Node<'a, 'input>,
    dialect: Dialect,
    tag: &str,
    container: &str,
) -> Vec<Node<'a, 'input>> {
    match dialect {
        Dialect::Wrapped => xml::child(object_el, container)
            .map(|c| xml::children(c, tag))
            .unwrap_or_default(),
        Dialect::Flat => xml::child(object_el, "ChildObjects")
            .map(|c| xml::children(c, tag))
            .unwrap_or_default(),
    }
}

/// Parses one object metadata file.
///
/// `name_hint` is the manifest-declared name, used when the file omits
/// `Properties/Name` (some adopted extension objects do).
pub fn parse_object(text: &str, object_type: ObjectType, name_hint: &str) -> Result<ParsedObject> {
    let doc = roxmltree::Document::parse(text).context("object file is not valid XML")?;
    let object_el = find_object_element(doc.root_element(), object_type)?;
    let dialect = Dialect::probe(object_el);

    let uuid = object_el.attribute("uuid").unwrap_or_default().to_string();
    let props = xml::child(object_el, "Properties");

    let mut parsed = ParsedObject {
        name: name_hint.to_string(),
        object_type,
        uuid,
        synonym: String::new(),
        comment: String::new(),
        belonging: None,
        extended_ref: None,
        attributes: Vec::new(),
        tabular_sections: Vec::new(),
        enum_values: Vec::new(),
        functional_option: None,
        default_forms: DefaultForms::default(),
    };

    if let Some(props) = props {
        if let Some(name) = xml::child_text(props, "Name").filter(|n| !n.is_empty()) {
            parsed.name = name;
        }
        parsed.synonym = xml::localized_child_text(props, "Synonym");
        parsed.comment = xml::child_text(props, "Comment").unwrap_or_default();
        parsed.belonging = xml::child_text(props, "ObjectBelonging")
            .as_deref()
            .and_then(Belonging::parse);
        parsed.extended_ref =
            xml::child_text(props, "ExtendedConfigurationObject").filter(|s| !s.is_empty());
        parsed.default_forms = DefaultForms {
            object: form_ref_name(xml::child_text(props, "DefaultObjectForm")),
            list: form_ref_name(xml::child_text(props, "DefaultListForm")),
            choice: form_ref_name(xml::child_text(props, "DefaultChoiceForm")),
        };

        for std_attr in standard_attributes(props) {
            parsed.attributes.push(std_attr);
        }
    }

    for node in sub_elements(object_el, dialect, "Attribute", "Attributes") {
        parsed
            .attributes
            .push(parse_attribute(node, AttributeSection::Attribute));
    }
    for node in sub_elements(object_el, dialect, "Dimension", "Dimensions") {
        parsed
            .attributes
            .push(parse_attribute(node, AttributeSection::Dimension));
    }
    for node in sub_elements(object_el, dialect, "Resource", "Resources") {
        parsed
            .attributes
            .push(parse_attribute(node, AttributeSection::Resource));
    }
    for node in sub_elements(object_el, dialect, "TabularSection", "TabularSections") {
        parsed.tabular_sections.push(parse_tabular_section(node));
    }
    for node in sub_elements(object_el, dialect, "EnumValue", "EnumValues") {
        parsed.enum_values.push(parse_enum_value(node));
    }

    if object_type == ObjectType::FunctionalOption {
        parsed.functional_option = Some(parse_functional_option(props));
    }

    Ok(parsed)
}

/// Finds the typed object element under the file root, accepting both the
/// plain tag (`Catalog`) and the extension alias (`MetaDataObject.Catalog`).
fn find_object_element<'a, 'input>(
    root: Node<'a, 'input>,
    object_type: ObjectType,
) -> Result<Node<'a, 'input>> {
    let plain = object_type.as_str();
    let aliased = format!("MetaDataObject.{plain}");
    if root.tag_name().name() == plain || root.tag_name().name() == aliased {
        return Ok(root);
    }
    let found = root.children().find(|n| {
        n.is_element() && (n.tag_name().name() == plain || n.tag_name().name() == aliased)
    });
    match found {
        Some(el) => Ok(el),
        None => bail!("no {plain} element in object file"),
    }
}

/// Last dot-segment of a form reference like `Catalog.X.Form.ФормаСписка`.
fn form_ref_name(value: Option<String>) -> Option<String> {
    let value = value?;
    let name = value.rsplit('.').next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn parse_attribute(node: Node, section: AttributeSection) -> ParsedAttribute {
    let props = xml::child(node, "Properties");
    ParsedAttribute {
        name: props
            .and_then(|p| xml::child_text(p, "Name"))
            .unwrap_or_default(),
        attribute_type: props
            .and_then(|p| xml::child(p, "Type"))
            .map(xml::joined_type)
            .unwrap_or_default(),
        title: props
            .map(|p| xml::localized_child_text(p, "Synonym"))
            .unwrap_or_default(),
        comment: props
            .and_then(|p| xml::child_text(p, "Comment"))
            .unwrap_or_default(),
        is_standard: false,
        standard_type: None,
        section,
    }
}

/// Standard attributes appear under `Properties/StandardAttributes` in both
/// dialects, keyed by a `name` attribute.
fn standard_attributes(props: Node) -> Vec<ParsedAttribute> {
    let Some(container) = xml::child(props, "StandardAttributes") else {
        return Vec::new();
    };
    xml::children(container, "StandardAttribute")
        .into_iter()
        .filter_map(|node| {
            let name = node.attribute("name")?.to_string();
            Some(ParsedAttribute {
                title: xml::localized_child_text(node, "Synonym"),
                comment: xml::child_text(node, "Comment").unwrap_or_default(),
                attribute_type: String::new(),
                is_standard: true,
                standard_type: Some(name.clone()),
                name,
                section: AttributeSection::Attribute,
            })
        })
        .collect()
}

fn parse_tabular_section(node: Node) -> ParsedTabularSection {
    let props = xml::child(node, "Properties");
    // Columns follow the same dialect split as the object itself, but the
    // probe is local to the section element.
    let dialect = Dialect::probe(node);
    let columns = sub_elements(node, dialect, "Attribute", "Attributes")
        .into_iter()
        .map(|col| {
            let col_props = xml::child(col, "Properties");
            ParsedTabularColumn {
                name: col_props
                    .and_then(|p| xml::child_text(p, "Name"))
                    .unwrap_or_default(),
                column_type: col_props
                    .and_then(|p| xml::child(p, "Type"))
                    .map(xml::joined_type)
                    .unwrap_or_default(),
                title: col_props
                    .map(|p| xml::localized_child_text(p, "Synonym"))
                    .unwrap_or_default(),
                comment: col_props
                    .and_then(|p| xml::child_text(p, "Comment"))
                    .unwrap_or_default(),
            }
        })
        .collect();

    ParsedTabularSection {
        name: props
            .and_then(|p| xml::child_text(p, "Name"))
            .unwrap_or_default(),
        title: props
            .map(|p| xml::localized_child_text(p, "Synonym"))
            .unwrap_or_default(),
        comment: props
            .and_then(|p| xml::child_text(p, "Comment"))
            .unwrap_or_default(),
        columns,
    }
}

fn parse_enum_value(node: Node) -> ParsedEnumValue {
    let props = xml::child(node, "Properties");
    ParsedEnumValue {
        name: props
            .and_then(|p| xml::child_text(p, "Name"))
            .unwrap_or_default(),
        // No explicit Order stays NULL; insertion id keeps declaration order.
        order: props
            .and_then(|p| xml::child_text(p, "Order"))
            .and_then(|o| o.parse().ok()),
        title: props
            .map(|p| xml::localized_child_text(p, "Synonym"))
            .unwrap_or_default(),
        comment: props
            .and_then(|p| xml::child_text(p, "Comment"))
            .unwrap_or_default(),
        belonging: props
            .and_then(|p| xml::child_text(p, "ObjectBelonging"))
            .as_deref()
            .and_then(Belonging::parse),
        extended_ref: props
            .and_then(|p| xml::child_text(p, "ExtendedConfigurationObject"))
            .filter(|s| !s.is_empty()),
    }
}

fn parse_functional_option(props: Option<Node>) -> ParsedFunctionalOption {
    let location = props
        .and_then(|p| xml::child_text(p, "Location"))
        .unwrap_or_default();
    // Stored without the `Constant.` prefix; queries show the bare name.
    let location_constant = location
        .strip_prefix("Constant.")
        .unwrap_or(&location)
        .to_string();
    let privileged_get_mode = xml::tri_state(props.and_then(|p| xml::child_text(p, "PrivilegedGetMode")));
    let content_refs = props
        .and_then(|p| xml::child(p, "Content"))
        .map(|content| {
            content
                .children()
                .filter(|n| n.is_element())
                .map(xml::text)
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    ParsedFunctionalOption {
        location_constant,
        privileged_get_mode,
        content_refs,
    }
}

/// Computes a form's kind from the owning object's declared default forms.
/// List and Choice are checked before Element because one form may serve
/// several roles; the first match wins.
pub fn classify_form_kind(form_name: &str, defaults: &DefaultForms) -> Option<FormKind> {
    if defaults.list.as_deref() == Some(form_name) {
        return Some(FormKind::List);
    }
    if defaults.choice.as_deref() == Some(form_name) {
        return Some(FormKind::Choice);
    }
    if defaults.object.as_deref() == Some(form_name) {
        return Some(FormKind::Element);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT_CATALOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <Catalog uuid="aaaa-bbbb">
    <Properties>
      <Name>Контрагенты</Name>
      <Synonym><item><lang>ru</lang><content>Контрагенты</content></item></Synonym>
      <Comment>Справочник контрагентов</Comment>
      <DefaultObjectForm>Catalog.Контрагенты.Form.ФормаЭлемента</DefaultObjectForm>
      <DefaultListForm>Catalog.Контрагенты.Form.ФормаСписка</DefaultListForm>
      <StandardAttributes>
        <StandardAttribute name="Code"/>
        <StandardAttribute name="Description"/>
      </StandardAttributes>
    </Properties>
    <ChildObjects>
      <Attribute uuid="a1">
        <Properties>
          <Name>ИНН</Name>
          <Type><Type>xs:string</Type></Type>
          <Synonym><item><lang>ru</lang><content>ИНН</content></item></Synonym>
        </Properties>
      </Attribute>
      <Attribute uuid="a2">
        <Properties>
          <Name>Ответственный</Name>
          <Type><Type>cfg:CatalogRef.Пользователи</Type><Type>xs:string</Type></Type>
        </Properties>
      </Attribute>
      <TabularSection uuid="t1">
        <Properties><Name>КонтактныеЛица</Name></Properties>
        <ChildObjects>
          <Attribute uuid="t1a">
            <Properties><Name>ФИО</Name><Type><Type>xs:string</Type></Type></Properties>
          </Attribute>
        </ChildObjects>
      </TabularSection>
      <Form>ФормаЭлемента</Form>
      <Form>ФормаСписка</Form>
    </ChildObjects>
  </Catalog>
</MetaDataObject>"#;

    const WRAPPED_REGISTER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <InformationRegister uuid="rrrr-0001">
    <Properties><Name>ЦеныНоменклатуры</Name></Properties>
    <Dimensions>
      <Dimension uuid="d1">
        <Properties><Name>Номенклатура</Name><Type><Type>cfg:CatalogRef.Номенклатура</Type></Type></Properties>
      </Dimension>
    </Dimensions>
    <Resources>
      <Resource uuid="r1">
        <Properties><Name>Цена</Name><Type><Type>xs:decimal</Type></Type></Properties>
      </Resource>
    </Resources>
  </InformationRegister>
</MetaDataObject>"#;

    const EXTENSION_OBJECT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <MetaDataObject.Catalog uuid="eeee-0001">
    <Properties>
      <Name>Контрагенты</Name>
      <ObjectBelonging>Adopted</ObjectBelonging>
      <ExtendedConfigurationObject>Catalog.Контрагенты</ExtendedConfigurationObject>
    </Properties>
  </MetaDataObject.Catalog>
</MetaDataObject>"#;

    const FUNCTIONAL_OPTION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <FunctionalOption uuid="ffff-0001">
    <Properties>
      <Name>ИспользоватьСкидки</Name>
      <Location>Constant.ИспользоватьСкидки</Location>
      <PrivilegedGetMode>true</PrivilegedGetMode>
      <Content>
        <Item>Document.РеализацияТоваров.Attribute.Скидка</Item>
        <Item>Catalog.Контрагенты</Item>
      </Content>
    </Properties>
  </FunctionalOption>
</MetaDataObject>"#;

    #[test]
    fn flat_dialect_catalog() {
        let obj = parse_object(FLAT_CATALOG, ObjectType::Catalog, "Контрагенты").unwrap();
        assert_eq!(obj.uuid, "aaaa-bbbb");
        assert_eq!(obj.name, "Контрагенты");
        assert_eq!(obj.synonym, "Контрагенты");
        assert_eq!(obj.comment, "Справочник контрагентов");

        // Standard attributes come first, then declared ones.
        let standard: Vec<_> = obj.attributes.iter().filter(|a| a.is_standard).collect();
        assert_eq!(standard.len(), 2);
        assert_eq!(standard[0].standard_type.as_deref(), Some("Code"));

        let inn = obj.attributes.iter().find(|a| a.name == "ИНН").unwrap();
        assert_eq!(inn.attribute_type, "xs:string");
        assert_eq!(inn.section, AttributeSection::Attribute);

        let composite = obj
            .attributes
            .iter()
            .find(|a| a.name == "Ответственный")
            .unwrap();
        assert_eq!(
            composite.attribute_type,
            "cfg:CatalogRef.Пользователи,xs:string"
        );

        assert_eq!(obj.tabular_sections.len(), 1);
        let ts = &obj.tabular_sections[0];
        assert_eq!(ts.name, "КонтактныеЛица");
        assert_eq!(ts.columns.len(), 1);
        assert_eq!(ts.columns[0].name, "ФИО");

        assert_eq!(obj.default_forms.object.as_deref(), Some("ФормаЭлемента"));
        assert_eq!(obj.default_forms.list.as_deref(), Some("ФормаСписка"));
    }

    #[test]
    fn wrapped_dialect_register() {
        let obj = parse_object(
            WRAPPED_REGISTER,
            ObjectType::InformationRegister,
            "ЦеныНоменклатуры",
        )
        .unwrap();
        let dims: Vec<_> = obj
            .attributes
            .iter()
            .filter(|a| a.section == AttributeSection::Dimension)
            .collect();
        let res: Vec<_> = obj
            .attributes
            .iter()
            .filter(|a| a.section == AttributeSection::Resource)
            .collect();
        assert_eq!(dims.len(), 1);
        assert_eq!(dims[0].name, "Номенклатура");
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].name, "Цена");
    }

    #[test]
    fn extension_alias_and_belonging() {
        let obj = parse_object(EXTENSION_OBJECT, ObjectType::Catalog, "Контрагенты").unwrap();
        assert_eq!(obj.uuid, "eeee-0001");
        assert_eq!(obj.belonging, Some(Belonging::Adopted));
        assert_eq!(obj.extended_ref.as_deref(), Some("Catalog.Контрагенты"));
    }

    #[test]
    fn functional_option_content_is_deferred_raw() {
        let obj = parse_object(
            FUNCTIONAL_OPTION,
            ObjectType::FunctionalOption,
            "ИспользоватьСкидки",
        )
        .unwrap();
        let fo = obj.functional_option.unwrap();
        assert_eq!(fo.location_constant, "ИспользоватьСкидки");
        assert_eq!(fo.privileged_get_mode, Some(true));
        assert_eq!(
            fo.content_refs,
            vec![
                "Document.РеализацияТоваров.Attribute.Скидка".to_string(),
                "Catalog.Контрагенты".to_string(),
            ]
        );
    }

    const ENUM_OBJECT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <Enum uuid="abab-0001">
    <Properties><Name>ВидыЦен</Name></Properties>
    <EnumValues>
      <EnumValue uuid="v1">
        <Properties><Name>Оптовая</Name><Order>5</Order></Properties>
      </EnumValue>
      <EnumValue uuid="v2">
        <Properties><Name>Розничная</Name></Properties>
      </EnumValue>
    </EnumValues>
  </Enum>
</MetaDataObject>"#;

    #[test]
    fn enum_value_without_order_stays_unset() {
        let obj = parse_object(ENUM_OBJECT, ObjectType::Enum, "ВидыЦен").unwrap();
        assert_eq!(obj.enum_values.len(), 2);
        assert_eq!(obj.enum_values[0].name, "Оптовая");
        assert_eq!(obj.enum_values[0].order, Some(5));
        assert_eq!(obj.enum_values[1].name, "Розничная");
        assert_eq!(obj.enum_values[1].order, None);
    }

    #[test]
    fn form_kind_checks_list_and_choice_before_element() {
        let defaults = DefaultForms {
            object: Some("Основная".into()),
            list: Some("Основная".into()),
            choice: None,
        };
        // The same form serves both roles; List wins.
        assert_eq!(
            classify_form_kind("Основная", &defaults),
            Some(FormKind::List)
        );
        assert_eq!(classify_form_kind("Другая", &defaults), None);
    }

    #[test]
    fn wrong_root_is_an_error() {
        assert!(parse_object("<Other/>", ObjectType::Catalog, "X").is_err());
    }
}
