//! Core data model for the configuration index.
//!
//! These types describe the entities an ingestion run produces: metadata
//! objects, their modules and procedure declarations, attributes and tabular
//! sections, forms with their UI trees, and functional options with their
//! cross-references.

use serde::Serialize;

/// The closed set of metadata object kinds a configuration export can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectType {
    Catalog,
    Document,
    CommonModule,
    InformationRegister,
    AccumulationRegister,
    AccountingRegister,
    CalculationRegister,
    ChartOfAccounts,
    ChartOfCharacteristicTypes,
    Report,
    DataProcessor,
    Enum,
    BusinessProcess,
    Task,
    FunctionalOption,
}

impl ObjectType {
    /// All supported types, in manifest enumeration order.
    pub const ALL: [ObjectType; 15] = [
        ObjectType::Catalog,
        ObjectType::Document,
        ObjectType::CommonModule,
        ObjectType::InformationRegister,
        ObjectType::AccumulationRegister,
        ObjectType::AccountingRegister,
        ObjectType::CalculationRegister,
        ObjectType::ChartOfAccounts,
        ObjectType::ChartOfCharacteristicTypes,
        ObjectType::Report,
        ObjectType::DataProcessor,
        ObjectType::Enum,
        ObjectType::BusinessProcess,
        ObjectType::Task,
        ObjectType::FunctionalOption,
    ];

    /// Tag name used for this type in the manifest and object files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Catalog => "Catalog",
            ObjectType::Document => "Document",
            ObjectType::CommonModule => "CommonModule",
            ObjectType::InformationRegister => "InformationRegister",
            ObjectType::AccumulationRegister => "AccumulationRegister",
            ObjectType::AccountingRegister => "AccountingRegister",
            ObjectType::CalculationRegister => "CalculationRegister",
            ObjectType::ChartOfAccounts => "ChartOfAccounts",
            ObjectType::ChartOfCharacteristicTypes => "ChartOfCharacteristicTypes",
            ObjectType::Report => "Report",
            ObjectType::DataProcessor => "DataProcessor",
            ObjectType::Enum => "Enum",
            ObjectType::BusinessProcess => "BusinessProcess",
            ObjectType::Task => "Task",
            ObjectType::FunctionalOption => "FunctionalOption",
        }
    }

    /// Per-type container directory in the export tree.
    pub fn container_dir(&self) -> &'static str {
        match self {
            ObjectType::Catalog => "Catalogs",
            ObjectType::Document => "Documents",
            ObjectType::CommonModule => "CommonModules",
            ObjectType::InformationRegister => "InformationRegisters",
            ObjectType::AccumulationRegister => "AccumulationRegisters",
            ObjectType::AccountingRegister => "AccountingRegisters",
            ObjectType::CalculationRegister => "CalculationRegisters",
            ObjectType::ChartOfAccounts => "ChartsOfAccounts",
            ObjectType::ChartOfCharacteristicTypes => "ChartsOfCharacteristicTypes",
            ObjectType::Report => "Reports",
            ObjectType::DataProcessor => "DataProcessors",
            ObjectType::Enum => "Enums",
            ObjectType::BusinessProcess => "BusinessProcesses",
            ObjectType::Task => "Tasks",
            ObjectType::FunctionalOption => "FunctionalOptions",
        }
    }

    pub fn parse(s: &str) -> Option<ObjectType> {
        ObjectType::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

/// Whether an extension object is its own or adopted from the base configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Belonging {
    Own,
    Adopted,
}

impl Belonging {
    pub fn as_str(&self) -> &'static str {
        match self {
            Belonging::Own => "Own",
            Belonging::Adopted => "Adopted",
        }
    }

    pub fn parse(s: &str) -> Option<Belonging> {
        match s {
            "Own" => Some(Belonging::Own),
            "Adopted" => Some(Belonging::Adopted),
            _ => None,
        }
    }
}

/// Kind of source module attached to an object or form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModuleType {
    Common,
    Manager,
    Object,
    Form,
}

impl ModuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Common => "Common",
            ModuleType::Manager => "Manager",
            ModuleType::Object => "Object",
            ModuleType::Form => "Form",
        }
    }

    pub fn parse(s: &str) -> Option<ModuleType> {
        match s {
            "Common" => Some(ModuleType::Common),
            "Manager" => Some(ModuleType::Manager),
            "Object" => Some(ModuleType::Object),
            "Form" => Some(ModuleType::Form),
            _ => None,
        }
    }

    /// Module file name under the object's `Ext/` directory.
    /// Form modules live under the form's own `Ext/Form/` and have no entry here.
    pub fn file_name(&self) -> Option<&'static str> {
        match self {
            ModuleType::Common => Some("Module.bsl"),
            ModuleType::Manager => Some("ManagerModule.bsl"),
            ModuleType::Object => Some("ObjectModule.bsl"),
            ModuleType::Form => None,
        }
    }
}

/// Where a procedure executes, inferred from its compiler directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionContext {
    Client,
    Server,
    ClientOrServer,
}

impl ExecutionContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionContext::Client => "Client",
            ExecutionContext::Server => "Server",
            ExecutionContext::ClientOrServer => "ClientOrServer",
        }
    }
}

/// Extension-hook role declared by an annotation directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtensionCallType {
    Before,
    After,
    Instead,
    ChangeAndControl,
}

impl ExtensionCallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionCallType::Before => "Before",
            ExtensionCallType::After => "After",
            ExtensionCallType::Instead => "Instead",
            ExtensionCallType::ChangeAndControl => "ChangeAndControl",
        }
    }
}

/// Procedure vs. function declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcKind {
    Procedure,
    Function,
}

impl ProcKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcKind::Procedure => "Procedure",
            ProcKind::Function => "Function",
        }
    }
}

/// A procedure or function declaration found in a module's source text.
///
/// `start_line` includes the contiguous run of directive lines immediately
/// above the declaration; `end_line` is `None` when no closing keyword was
/// found before the end of the module (open-ended span).
#[derive(Debug, Clone)]
pub struct ProcedureDecl {
    pub name: String,
    pub kind: ProcKind,
    pub params: String,
    pub is_export: bool,
    pub start_line: i64,
    pub end_line: Option<i64>,
    pub execution_context: Option<ExecutionContext>,
    pub extension_call_type: Option<ExtensionCallType>,
}

/// Section an attribute row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttributeSection {
    Attribute,
    Dimension,
    Resource,
}

impl AttributeSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeSection::Attribute => "Attribute",
            AttributeSection::Dimension => "Dimension",
            AttributeSection::Resource => "Resource",
        }
    }
}

/// Attribute, register dimension, or register resource of an object.
#[derive(Debug, Clone)]
pub struct ParsedAttribute {
    pub name: String,
    /// Single type name, or a comma-joined set for composite types.
    pub attribute_type: String,
    pub title: String,
    pub comment: String,
    pub is_standard: bool,
    pub standard_type: Option<String>,
    pub section: AttributeSection,
}

#[derive(Debug, Clone)]
pub struct ParsedTabularColumn {
    pub name: String,
    pub column_type: String,
    pub title: String,
    pub comment: String,
}

#[derive(Debug, Clone)]
pub struct ParsedTabularSection {
    pub name: String,
    pub title: String,
    pub comment: String,
    pub columns: Vec<ParsedTabularColumn>,
}

#[derive(Debug, Clone)]
pub struct ParsedEnumValue {
    pub name: String,
    pub order: Option<i64>,
    pub title: String,
    pub comment: String,
    pub belonging: Option<Belonging>,
    pub extended_ref: Option<String>,
}

/// Functional-option definition as found in the object file. The raw
/// content-reference strings are resolved in pass 2, never here.
#[derive(Debug, Clone)]
pub struct ParsedFunctionalOption {
    pub location_constant: String,
    pub privileged_get_mode: Option<bool>,
    pub content_refs: Vec<String>,
}

/// Default/auxiliary form names declared on the owning object, used to
/// classify each form's kind.
#[derive(Debug, Clone, Default)]
pub struct DefaultForms {
    pub object: Option<String>,
    pub list: Option<String>,
    pub choice: Option<String>,
}

/// The role a form plays for its owning object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FormKind {
    Element,
    List,
    Choice,
}

impl FormKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormKind::Element => "Element",
            FormKind::List => "List",
            FormKind::Choice => "Choice",
        }
    }
}

/// Form event or item event: name, handler, optional call type.
#[derive(Debug, Clone)]
pub struct ParsedFormEvent {
    pub event_name: String,
    pub handler: String,
    pub call_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedFormAttribute {
    pub name: String,
    pub attr_type: String,
    pub title: String,
    pub is_main: bool,
    pub query_text: Option<String>,
    pub columns: Vec<String>,
    /// Functional-option usage markers (uuid or `FunctionalOption.<name>`).
    pub fo_markers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedFormCommand {
    pub name: String,
    pub title: String,
    pub action: String,
    pub shortcut: String,
    pub representation: String,
    pub fo_markers: Vec<String>,
}

/// One node of a form's UI tree. `local_id`/`parent_local_id` are stable
/// within the form; the loader remaps them to database row ids on insert.
#[derive(Debug, Clone)]
pub struct ParsedFormItem {
    pub local_id: i64,
    pub parent_local_id: Option<i64>,
    pub name: String,
    pub item_type: String,
    pub data_path: String,
    pub title: String,
    pub visible: Option<bool>,
    pub enabled: Option<bool>,
    pub events: Vec<ParsedFormEvent>,
    pub fo_markers: Vec<String>,
}

/// Fully parsed form: metadata, UI definition, and module source.
#[derive(Debug, Clone)]
pub struct ParsedForm {
    pub name: String,
    pub uuid: String,
    pub kind: Option<FormKind>,
    /// Whitelisted scalar properties from the UI definition.
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub events: Vec<ParsedFormEvent>,
    pub attributes: Vec<ParsedFormAttribute>,
    pub commands: Vec<ParsedFormCommand>,
    pub items: Vec<ParsedFormItem>,
    /// Opaque conditional-appearance fragment, kept verbatim.
    pub conditional_appearance: Option<String>,
    pub module_text: Option<String>,
}

/// Structural parse result for one object file. Modules and forms are read
/// separately by the ingestion pipeline; this covers the object XML only.
#[derive(Debug, Clone)]
pub struct ParsedObject {
    pub name: String,
    pub object_type: ObjectType,
    pub uuid: String,
    pub synonym: String,
    pub comment: String,
    pub belonging: Option<Belonging>,
    pub extended_ref: Option<String>,
    pub attributes: Vec<ParsedAttribute>,
    pub tabular_sections: Vec<ParsedTabularSection>,
    pub enum_values: Vec<ParsedEnumValue>,
    pub functional_option: Option<ParsedFunctionalOption>,
    pub default_forms: DefaultForms,
}

/// The kind of entity a resolved content reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContentRefType {
    Object,
    Attribute,
    Resource,
    Dimension,
    TabularSectionColumn,
}

impl ContentRefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentRefType::Object => "Object",
            ContentRefType::Attribute => "Attribute",
            ContentRefType::Resource => "Resource",
            ContentRefType::Dimension => "Dimension",
            ContentRefType::TabularSectionColumn => "TabularSectionColumn",
        }
    }
}

/// Kind of form element a functional-option usage marker sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FormElementType {
    FormAttribute,
    FormCommand,
    FormItem,
}

impl FormElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormElementType::FormAttribute => "FormAttribute",
            FormElementType::FormCommand => "FormCommand",
            FormElementType::FormItem => "FormItem",
        }
    }
}
