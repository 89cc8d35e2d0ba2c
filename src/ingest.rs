//! Ingestion pipeline: orchestrates the two-pass load of a configuration
//! export into the index database.
//!
//! Pass 1 walks the manifest's object list, parsing each object file with
//! its own modules and loading objects, attributes, tabular sections, enum
//! values, and functional-option definitions. Pass 1 commits before pass 2
//! starts. Pass 2 parses forms, loads form contents and form modules, and
//! resolves functional-option cross-references against the now-committed
//! pass-1 ids.
//!
//! A malformed object or form file degrades to a skip entry in the report;
//! only a missing or malformed manifest aborts the run.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

use crate::bsl;
use crate::form::{self, FormSkip};
use crate::loader::EntityLoader;
use crate::locator::{self, ObjectRef};
use crate::migrate;
use crate::models::{DefaultForms, FormElementType, ModuleType, ObjectType, ParsedForm};
use crate::progress::ProgressReporter;
use crate::resolver::Resolver;
use crate::structural;
use crate::xml;

/// One input file or form that was skipped with the reason, for the report.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedItem {
    pub item: String,
    pub reason: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub configuration_name: String,
    pub objects: u64,
    pub modules: u64,
    pub procedures: u64,
    pub forms: u64,
    pub content_refs: u64,
    pub form_usages: u64,
    pub dropped_refs: u64,
    pub skipped: Vec<SkippedItem>,
}

/// Pass-1 state carried over to pass 2 for one object.
struct PendingObject {
    object_id: i64,
    object_type: ObjectType,
    name: String,
    object_dir: PathBuf,
    default_forms: DefaultForms,
    /// (functional_options row id, raw content-ref strings)
    functional_option: Option<(i64, Vec<String>)>,
}

/// Runs a full ingestion of the export at `export_dir` into `pool`.
pub async fn run_ingest(
    pool: &SqlitePool,
    export_dir: &Path,
    progress: &dyn ProgressReporter,
) -> Result<IngestReport> {
    migrate::run_migrations(pool).await?;

    let manifest = locator::read_manifest(&export_dir.join("Configuration.xml"))?;
    let total = manifest.objects.len() as u64 + 1;

    let mut report = IngestReport {
        configuration_name: manifest.configuration_name.clone(),
        ..Default::default()
    };
    let mut loader = EntityLoader::new(pool.clone());
    let mut resolver = Resolver::new();
    let mut pending = Vec::new();

    loader.begin_run().await?;

    for (i, object_ref) in manifest.objects.iter().enumerate() {
        progress.report(
            i as u64 + 1,
            total,
            &format!("{}.{}", object_ref.object_type.as_str(), object_ref.name),
        );
        if let Some(p) = ingest_object(&mut loader, &mut resolver, object_ref, &mut report).await? {
            pending.push(p);
        }
    }

    loader.commit_pass1().await?;

    progress.report(total, total, "resolving references");
    loader.begin_pass2().await?;

    for object in &pending {
        ingest_forms(&mut loader, &mut resolver, object, &mut report).await?;
    }

    for object in &pending {
        let Some((option_id, refs)) = &object.functional_option else {
            continue;
        };
        for raw in refs {
            if let Some(resolved) = resolver.resolve_content_ref(raw) {
                loader.insert_content_ref(*option_id, &resolved).await?;
                report.content_refs += 1;
            }
        }
    }

    loader.commit_pass2().await?;
    report.dropped_refs = resolver.dropped();

    Ok(report)
}

/// Parses and loads one manifest object. Returns the pass-2 state, or `None`
/// when the object file was skipped.
async fn ingest_object(
    loader: &mut EntityLoader,
    resolver: &mut Resolver,
    object_ref: &ObjectRef,
    report: &mut IngestReport,
) -> Result<Option<PendingObject>> {
    let label = format!("{}.{}", object_ref.object_type.as_str(), object_ref.name);

    let text = match xml::read_file(&object_ref.xml_path) {
        Ok(text) => text,
        Err(err) => {
            report.skipped.push(SkippedItem {
                item: label,
                reason: format!("{err:#}"),
            });
            return Ok(None);
        }
    };
    let parsed = match structural::parse_object(&text, object_ref.object_type, &object_ref.name) {
        Ok(parsed) => parsed,
        Err(err) => {
            report.skipped.push(SkippedItem {
                item: label,
                reason: format!("{err:#}"),
            });
            return Ok(None);
        }
    };

    let object_id = loader.insert_object(&parsed).await?;
    resolver.add_object(parsed.object_type, &parsed.name, object_id);
    report.objects += 1;

    for attribute in &parsed.attributes {
        loader.insert_attribute(object_id, attribute).await?;
    }
    for section in &parsed.tabular_sections {
        loader.insert_tabular_section(object_id, section).await?;
    }
    for value in &parsed.enum_values {
        loader.insert_enum_value(object_id, value).await?;
    }

    for module_type in own_module_types(parsed.object_type) {
        let Some(file_name) = module_type.file_name() else {
            continue;
        };
        let path = object_ref.object_dir.join("Ext").join(file_name);
        if !path.is_file() {
            continue;
        }
        // A module that exists but cannot be read (wrong encoding, broken
        // permissions) loses only that module, not the run.
        let code = match xml::read_file(&path) {
            Ok(code) => code,
            Err(err) => {
                report.skipped.push(SkippedItem {
                    item: format!("{label}.{}", module_type.as_str()),
                    reason: format!("{err:#}"),
                });
                continue;
            }
        };
        let decls = bsl::scan_module(&code);
        let module_id = loader
            .insert_module(object_id, None, &parsed.name, *module_type, &code)
            .await?;
        loader.insert_procedures(module_id, &decls).await?;
        report.modules += 1;
        report.procedures += decls.len() as u64;
    }

    let functional_option = match &parsed.functional_option {
        Some(option) => {
            let option_id = loader.insert_functional_option(object_id, option).await?;
            resolver.add_option(&parsed.uuid, &parsed.name, option_id);
            Some((option_id, option.content_refs.clone()))
        }
        None => None,
    };

    Ok(Some(PendingObject {
        object_id,
        object_type: parsed.object_type,
        name: parsed.name,
        object_dir: object_ref.object_dir.clone(),
        default_forms: parsed.default_forms,
        functional_option,
    }))
}

/// Module kinds an object owns directly (form modules are handled in pass 2).
fn own_module_types(object_type: ObjectType) -> &'static [ModuleType] {
    match object_type {
        ObjectType::CommonModule => &[ModuleType::Common],
        ObjectType::Enum | ObjectType::FunctionalOption => &[],
        _ => &[ModuleType::Object, ModuleType::Manager],
    }
}

/// Pass 2 for one object: forms, form modules, and functional-option
/// bindings on form elements.
async fn ingest_forms(
    loader: &mut EntityLoader,
    resolver: &mut Resolver,
    object: &PendingObject,
    report: &mut IngestReport,
) -> Result<()> {
    let (forms, skips) = form::parse_forms(&object.object_dir, &object.default_forms);
    for FormSkip { form_name, reason } in skips {
        report.skipped.push(SkippedItem {
            item: format!(
                "{}.{}.Forms.{}",
                object.object_type.as_str(),
                object.name,
                form_name
            ),
            reason,
        });
    }

    for parsed_form in forms {
        let form_id = loader.insert_form(object.object_id, &parsed_form).await?;
        report.forms += 1;

        if let Some(code) = &parsed_form.module_text {
            let decls = bsl::scan_module(code);
            let module_id = loader
                .insert_module(
                    object.object_id,
                    Some(form_id),
                    &object.name,
                    ModuleType::Form,
                    code,
                )
                .await?;
            loader.insert_procedures(module_id, &decls).await?;
            report.modules += 1;
            report.procedures += decls.len() as u64;
        }

        record_form_usages(loader, resolver, object, form_id, &parsed_form, report).await?;
    }

    Ok(())
}

async fn record_form_usages(
    loader: &mut EntityLoader,
    resolver: &mut Resolver,
    object: &PendingObject,
    form_id: i64,
    parsed_form: &ParsedForm,
    report: &mut IngestReport,
) -> Result<()> {
    let mut usages: Vec<(FormElementType, &str, &[String])> = Vec::new();
    for attribute in &parsed_form.attributes {
        usages.push((
            FormElementType::FormAttribute,
            &attribute.name,
            &attribute.fo_markers,
        ));
    }
    for command in &parsed_form.commands {
        usages.push((
            FormElementType::FormCommand,
            &command.name,
            &command.fo_markers,
        ));
    }
    for item in &parsed_form.items {
        usages.push((FormElementType::FormItem, &item.name, &item.fo_markers));
    }

    for (element_type, element_name, markers) in usages {
        for marker in markers {
            let Some(option_id) = resolver.resolve_marker(marker) else {
                continue;
            };
            loader
                .insert_form_usage(
                    option_id,
                    object.object_id,
                    Some(form_id),
                    element_type,
                    element_name,
                )
                .await?;
            report.form_usages += 1;
        }
    }

    Ok(())
}
