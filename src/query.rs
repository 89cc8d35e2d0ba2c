//! Read contract over an index database.
//!
//! Every operation takes a `&SqlitePool` and returns serde-serializable
//! result types; the CLI prints them as JSON. Lookups never guess: an
//! ambiguous partial object match is returned as a candidate list for the
//! caller to narrow.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::models::ModuleType;

/// Characters FTS5 treats as syntax; a query containing any of them is run
/// through the LIKE path instead.
const FTS_SPECIAL: &[char] = &['.', '(', ')', '[', ']', '"', '\''];

fn is_fts_safe(query: &str) -> bool {
    !query.contains(FTS_SPECIAL)
}

fn like_pattern(needle: &str) -> String {
    format!("%{needle}%")
}

/// Line-bounded snippet around the first occurrence of `needle` in `code`:
/// the matching line with up to two lines of context on each side, plus the
/// 1-based line number of the match. Falls back to the head of the module
/// when the needle is not found verbatim (FTS stemming can match variants).
fn snippet_around(code: &str, needle: &str) -> (i64, String) {
    let lines: Vec<&str> = code.lines().collect();
    let needle_lower = needle.to_lowercase();
    let hit = lines
        .iter()
        .position(|line| line.to_lowercase().contains(&needle_lower))
        .unwrap_or(0);
    let from = hit.saturating_sub(2);
    let to = (hit + 3).min(lines.len());
    (hit as i64 + 1, lines[from..to].join("\n"))
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub object_name: String,
    pub module_type: String,
    pub form_name: Option<String>,
    pub line: i64,
    pub snippet: String,
}

/// Full-text search over module source. FTS5 MATCH for plain queries; LIKE
/// scan when the query contains FTS special characters or when filters are
/// present (FTS cannot combine MATCH with column filters on an
/// external-content table without re-checking anyway).
pub async fn search_code(
    pool: &SqlitePool,
    query: &str,
    object_name: Option<&str>,
    module_type: Option<ModuleType>,
    limit: i64,
) -> Result<Vec<SearchHit>> {
    let use_fts = is_fts_safe(query) && object_name.is_none() && module_type.is_none();

    let rows = if use_fts {
        sqlx::query(
            r#"
            SELECT m.object_name, m.module_type, m.code, f.form_name
            FROM code_search
            JOIN modules m ON m.id = code_search.rowid
            LEFT JOIN forms f ON f.id = m.form_id
            WHERE code_search MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(query)
        .bind(limit)
        .fetch_all(pool)
        .await?
    } else {
        let mut sql = String::from(
            "SELECT m.object_name, m.module_type, m.code, f.form_name
             FROM modules m
             LEFT JOIN forms f ON f.id = m.form_id
             WHERE m.code LIKE ?",
        );
        if object_name.is_some() {
            sql.push_str(" AND m.object_name LIKE ?");
        }
        if module_type.is_some() {
            sql.push_str(" AND m.module_type = ?");
        }
        sql.push_str(" LIMIT ?");

        let mut q = sqlx::query(&sql).bind(like_pattern(query));
        if let Some(name) = object_name {
            q = q.bind(like_pattern(name));
        }
        if let Some(mt) = module_type {
            q = q.bind(mt.as_str());
        }
        q.bind(limit).fetch_all(pool).await?
    };

    Ok(rows
        .iter()
        .map(|row| {
            let code: String = row.get("code");
            let (line, snippet) = snippet_around(&code, query);
            SearchHit {
                object_name: row.get("object_name"),
                module_type: row.get("module_type"),
                form_name: row.get("form_name"),
                line,
                snippet,
            }
        })
        .collect())
}

#[derive(Debug, Serialize)]
pub struct ModuleSummary {
    pub module_type: String,
    pub form_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FormSummary {
    pub object_name: String,
    pub form_name: String,
    pub form_kind: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ObjectSummary {
    pub object_type: String,
    pub name: String,
    pub synonym: String,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_belonging: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_configuration_object: Option<String>,
    pub modules: Vec<ModuleSummary>,
    pub forms: Vec<FormSummary>,
}

async fn object_summary(pool: &SqlitePool, row: &sqlx::sqlite::SqliteRow) -> Result<ObjectSummary> {
    let object_id: i64 = row.get("id");
    let name: String = row.get("name");

    let modules = sqlx::query(
        "SELECT m.module_type, f.form_name
         FROM modules m LEFT JOIN forms f ON f.id = m.form_id
         WHERE m.object_id = ? ORDER BY m.id",
    )
    .bind(object_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|m| ModuleSummary {
        module_type: m.get("module_type"),
        form_name: m.get("form_name"),
    })
    .collect();

    let forms = sqlx::query("SELECT form_name, form_kind FROM forms WHERE object_id = ? ORDER BY id")
        .bind(object_id)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|f| FormSummary {
            object_name: name.clone(),
            form_name: f.get("form_name"),
            form_kind: f.get("form_kind"),
        })
        .collect();

    Ok(ObjectSummary {
        object_type: row.get("object_type"),
        name,
        synonym: row.get("synonym"),
        comment: row.get("comment"),
        object_belonging: row.get("object_belonging"),
        extended_configuration_object: row.get("extended_configuration_object"),
        modules,
        forms,
    })
}

/// Partial, case-insensitive lookup by name, optionally narrowed by type.
pub async fn find_objects(
    pool: &SqlitePool,
    name: &str,
    object_type: Option<&str>,
    limit: i64,
) -> Result<Vec<ObjectSummary>> {
    let rows = if let Some(ty) = object_type {
        sqlx::query(
            "SELECT * FROM metadata_objects
             WHERE name LIKE ? AND object_type = ? ORDER BY name LIMIT ?",
        )
        .bind(like_pattern(name))
        .bind(ty)
        .bind(limit)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query("SELECT * FROM metadata_objects WHERE name LIKE ? ORDER BY name LIMIT ?")
            .bind(like_pattern(name))
            .bind(limit)
            .fetch_all(pool)
            .await?
    };

    let mut results = Vec::with_capacity(rows.len());
    for row in &rows {
        results.push(object_summary(pool, row).await?);
    }
    Ok(results)
}

#[derive(Debug, Serialize)]
pub struct TypeGroup {
    pub object_type: String,
    pub total: i64,
    pub names: Vec<String>,
    pub truncated: bool,
}

/// Object inventory grouped by type, each group truncated to `limit` names.
pub async fn list_objects(
    pool: &SqlitePool,
    object_type: Option<&str>,
    limit: i64,
) -> Result<Vec<TypeGroup>> {
    let rows = if let Some(ty) = object_type {
        sqlx::query(
            "SELECT object_type, name FROM metadata_objects
             WHERE object_type = ? ORDER BY object_type, name",
        )
        .bind(ty)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query("SELECT object_type, name FROM metadata_objects ORDER BY object_type, name")
            .fetch_all(pool)
            .await?
    };

    let mut groups: Vec<TypeGroup> = Vec::new();
    for row in &rows {
        let ty: String = row.get("object_type");
        let name: String = row.get("name");
        match groups.last_mut() {
            Some(group) if group.object_type == ty => {
                group.total += 1;
                if (group.names.len() as i64) < limit {
                    group.names.push(name);
                } else {
                    group.truncated = true;
                }
            }
            _ => groups.push(TypeGroup {
                object_type: ty,
                total: 1,
                names: vec![name],
                truncated: false,
            }),
        }
    }
    Ok(groups)
}

#[derive(Debug, Serialize)]
pub struct AttributeRow {
    pub name: String,
    pub attribute_type: String,
    pub title: String,
    pub section: String,
    pub is_standard: bool,
}

#[derive(Debug, Serialize)]
pub struct TabularSectionRow {
    pub name: String,
    pub title: String,
    pub columns: Vec<AttributeRow>,
}

#[derive(Debug, Serialize)]
pub struct EnumValueRow {
    pub name: String,
    pub enum_order: Option<i64>,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct ContentRefRow {
    pub object_type: String,
    pub object_name: String,
    pub content_ref_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tabular_section_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_name: Option<String>,
}

/// One place a functional option is bound to a form element.
#[derive(Debug, Serialize)]
pub struct OptionUsageSite {
    pub object_type: String,
    pub object_name: String,
    pub form_name: Option<String>,
    pub element_type: String,
    pub element_name: String,
}

#[derive(Debug, Serialize)]
pub struct FunctionalOptionInfo {
    pub name: String,
    pub location_constant: String,
    pub privileged_get_mode: Option<bool>,
    pub content: Vec<ContentRefRow>,
    pub usages: Vec<OptionUsageSite>,
}

#[derive(Debug, Serialize)]
pub struct ObjectStructure {
    #[serde(flatten)]
    pub summary: ObjectSummary,
    pub attributes: Vec<AttributeRow>,
    pub tabular_sections: Vec<TabularSectionRow>,
    pub enum_values: Vec<EnumValueRow>,
}

/// Outcome of a structure lookup. A partial match that hits several objects
/// comes back as the candidate list, never a guess.
#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StructureResult {
    NotFound,
    Ambiguous { candidates: Vec<String> },
    Object(Box<ObjectStructure>),
    FunctionalOption(Box<FunctionalOptionInfo>),
}

/// Structure of one object: exact name match first, then partial.
pub async fn object_structure(pool: &SqlitePool, name: &str) -> Result<StructureResult> {
    let exact = sqlx::query("SELECT * FROM metadata_objects WHERE name = ?")
        .bind(name)
        .fetch_all(pool)
        .await?;

    let row = if let Some(row) = exact.into_iter().next() {
        row
    } else {
        let mut partial =
            sqlx::query("SELECT * FROM metadata_objects WHERE name LIKE ? ORDER BY name")
                .bind(like_pattern(name))
                .fetch_all(pool)
                .await?;
        match partial.len() {
            0 => return Ok(StructureResult::NotFound),
            1 => partial.remove(0),
            _ => {
                let candidates = partial
                    .iter()
                    .map(|r| {
                        let ty: String = r.get("object_type");
                        let n: String = r.get("name");
                        format!("{ty}.{n}")
                    })
                    .collect();
                return Ok(StructureResult::Ambiguous { candidates });
            }
        }
    };

    let object_id: i64 = row.get("id");
    let object_type: String = row.get("object_type");

    if object_type == "FunctionalOption" {
        let info = functional_option_info(pool, object_id, row.get("name")).await?;
        return Ok(StructureResult::FunctionalOption(Box::new(info)));
    }

    let attributes = sqlx::query(
        "SELECT name, attribute_type, title, section, is_standard
         FROM attributes WHERE object_id = ? ORDER BY id",
    )
    .bind(object_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(attribute_row)
    .collect();

    let mut tabular_sections = Vec::new();
    for ts in sqlx::query("SELECT id, name, title FROM tabular_sections WHERE object_id = ? ORDER BY id")
        .bind(object_id)
        .fetch_all(pool)
        .await?
    {
        let section_id: i64 = ts.get("id");
        let columns = sqlx::query(
            "SELECT column_name AS name, column_type AS attribute_type, title
             FROM tabular_section_columns WHERE tabular_section_id = ? ORDER BY id",
        )
        .bind(section_id)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|c| AttributeRow {
            name: c.get("name"),
            attribute_type: c.get("attribute_type"),
            title: c.get("title"),
            section: "TabularSectionColumn".to_string(),
            is_standard: false,
        })
        .collect();
        tabular_sections.push(TabularSectionRow {
            name: ts.get("name"),
            title: ts.get("title"),
            columns,
        });
    }

    let enum_values = sqlx::query(
        "SELECT name, enum_order, title FROM enum_values WHERE object_id = ?
         ORDER BY enum_order IS NULL, enum_order, id",
    )
    .bind(object_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|v| EnumValueRow {
        name: v.get("name"),
        enum_order: v.get("enum_order"),
        title: v.get("title"),
    })
    .collect();

    Ok(StructureResult::Object(Box::new(ObjectStructure {
        summary: object_summary(pool, &row).await?,
        attributes,
        tabular_sections,
        enum_values,
    })))
}

fn attribute_row(row: &sqlx::sqlite::SqliteRow) -> AttributeRow {
    AttributeRow {
        name: row.get("name"),
        attribute_type: row.get("attribute_type"),
        title: row.get("title"),
        section: row.get("section"),
        is_standard: row.get("is_standard"),
    }
}

async fn functional_option_info(
    pool: &SqlitePool,
    object_id: i64,
    name: String,
) -> Result<FunctionalOptionInfo> {
    let option = sqlx::query(
        "SELECT id, location_constant, privileged_get_mode
         FROM functional_options WHERE object_id = ?",
    )
    .bind(object_id)
    .fetch_optional(pool)
    .await?;

    let Some(option) = option else {
        return Ok(FunctionalOptionInfo {
            name,
            location_constant: String::new(),
            privileged_get_mode: None,
            content: Vec::new(),
            usages: Vec::new(),
        });
    };

    let option_id: i64 = option.get("id");
    let content = sqlx::query(
        r#"
        SELECT o.object_type, o.name AS object_name, r.content_ref_type,
               r.tabular_section_name, r.element_name
        FROM fo_content_ref r
        JOIN metadata_objects o ON o.id = r.metadata_object_id
        WHERE r.functional_option_id = ?
        ORDER BY r.id
        "#,
    )
    .bind(option_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(content_ref_row)
    .collect();

    let usages = sqlx::query(
        r#"
        SELECT owner.object_type, owner.name AS object_name, f.form_name,
               u.element_type, u.element_name
        FROM fo_form_usage u
        JOIN metadata_objects owner ON owner.id = u.owner_object_id
        LEFT JOIN forms f ON f.id = u.form_id
        WHERE u.functional_option_id = ?
        ORDER BY u.id
        "#,
    )
    .bind(option_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| OptionUsageSite {
        object_type: row.get("object_type"),
        object_name: row.get("object_name"),
        form_name: row.get("form_name"),
        element_type: row.get("element_type"),
        element_name: row.get("element_name"),
    })
    .collect();

    Ok(FunctionalOptionInfo {
        name,
        location_constant: option.get("location_constant"),
        privileged_get_mode: option.get("privileged_get_mode"),
        content,
        usages,
    })
}

fn content_ref_row(row: &sqlx::sqlite::SqliteRow) -> ContentRefRow {
    ContentRefRow {
        object_type: row.get("object_type"),
        object_name: row.get("object_name"),
        content_ref_type: row.get("content_ref_type"),
        tabular_section_name: row.get("tabular_section_name"),
        element_name: row.get("element_name"),
    }
}

/// Fetches the module row for (object, module type, optional form).
async fn module_row(
    pool: &SqlitePool,
    object: &str,
    module_type: ModuleType,
    form: Option<&str>,
) -> Result<Option<sqlx::sqlite::SqliteRow>> {
    let row = if let Some(form_name) = form {
        sqlx::query(
            r#"
            SELECT m.id, m.code FROM modules m
            JOIN metadata_objects o ON o.id = m.object_id
            JOIN forms f ON f.id = m.form_id
            WHERE o.name = ? AND m.module_type = ? AND f.form_name = ?
            "#,
        )
        .bind(object)
        .bind(module_type.as_str())
        .bind(form_name)
        .fetch_optional(pool)
        .await?
    } else {
        sqlx::query(
            r#"
            SELECT m.id, m.code FROM modules m
            JOIN metadata_objects o ON o.id = m.object_id
            WHERE o.name = ? AND m.module_type = ? AND m.form_id IS NULL
            "#,
        )
        .bind(object)
        .bind(module_type.as_str())
        .fetch_optional(pool)
        .await?
    };
    Ok(row)
}

/// Full source of one module.
pub async fn module_code(
    pool: &SqlitePool,
    object: &str,
    module_type: ModuleType,
    form: Option<&str>,
) -> Result<Option<String>> {
    Ok(module_row(pool, object, module_type, form)
        .await?
        .map(|row| row.get("code")))
}

#[derive(Debug, Serialize)]
pub struct ProcedureRow {
    pub name: String,
    pub proc_type: String,
    pub params: String,
    pub is_export: bool,
    pub start_line: i64,
    pub end_line: Option<i64>,
    pub execution_context: Option<String>,
    pub extension_call_type: Option<String>,
}

/// Declarations of one module, in source order.
pub async fn module_procedures(
    pool: &SqlitePool,
    object: &str,
    module_type: ModuleType,
    form: Option<&str>,
) -> Result<Vec<ProcedureRow>> {
    let Some(module) = module_row(pool, object, module_type, form).await? else {
        return Ok(Vec::new());
    };
    let module_id: i64 = module.get("id");

    Ok(sqlx::query(
        "SELECT name, proc_type, params, is_export, start_line, end_line,
                execution_context, extension_call_type
         FROM module_procedures WHERE module_id = ? ORDER BY start_line",
    )
    .bind(module_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| ProcedureRow {
        name: row.get("name"),
        proc_type: row.get("proc_type"),
        params: row.get("params"),
        is_export: row.get("is_export"),
        start_line: row.get("start_line"),
        end_line: row.get("end_line"),
        execution_context: row.get("execution_context"),
        extension_call_type: row.get("extension_call_type"),
    })
    .collect())
}

#[derive(Debug, Serialize)]
pub struct ProcedureCode {
    pub name: String,
    pub start_line: i64,
    pub end_line: Option<i64>,
    pub code: String,
}

/// Source of one procedure, sliced out of its module by recorded line span.
/// An open-ended span (no closing keyword) runs through the end of the
/// module.
pub async fn procedure_code(
    pool: &SqlitePool,
    object: &str,
    procedure: &str,
    module_type: ModuleType,
    form: Option<&str>,
) -> Result<Option<ProcedureCode>> {
    let Some(module) = module_row(pool, object, module_type, form).await? else {
        return Ok(None);
    };
    let module_id: i64 = module.get("id");
    let code: String = module.get("code");

    let Some(row) = sqlx::query(
        "SELECT name, start_line, end_line FROM module_procedures
         WHERE module_id = ? AND name = ?",
    )
    .bind(module_id)
    .bind(procedure)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let start_line: i64 = row.get("start_line");
    let end_line: Option<i64> = row.get("end_line");

    let lines: Vec<&str> = code.lines().collect();
    let from = (start_line.max(1) as usize - 1).min(lines.len());
    let to = end_line
        .map(|e| (e as usize).min(lines.len()))
        .unwrap_or(lines.len());

    Ok(Some(ProcedureCode {
        name: row.get("name"),
        start_line,
        end_line,
        code: lines[from..to].join("\n"),
    }))
}

/// Partial-match form lookup, optionally narrowed to one owning object.
pub async fn find_forms(
    pool: &SqlitePool,
    name: Option<&str>,
    object: Option<&str>,
    limit: i64,
) -> Result<Vec<FormSummary>> {
    let mut sql = String::from(
        "SELECT o.name AS object_name, f.form_name, f.form_kind
         FROM forms f JOIN metadata_objects o ON o.id = f.object_id WHERE 1=1",
    );
    if name.is_some() {
        sql.push_str(" AND f.form_name LIKE ?");
    }
    if object.is_some() {
        sql.push_str(" AND o.name LIKE ?");
    }
    sql.push_str(" ORDER BY o.name, f.form_name LIMIT ?");

    let mut q = sqlx::query(&sql);
    if let Some(name) = name {
        q = q.bind(like_pattern(name));
    }
    if let Some(object) = object {
        q = q.bind(like_pattern(object));
    }

    Ok(q.bind(limit)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| FormSummary {
            object_name: row.get("object_name"),
            form_name: row.get("form_name"),
            form_kind: row.get("form_kind"),
        })
        .collect())
}

#[derive(Debug, Serialize)]
pub struct FormEventRow {
    pub event_name: String,
    pub handler: String,
    pub call_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FormAttributeRow {
    pub name: String,
    pub attribute_type: String,
    pub title: String,
    pub is_main: bool,
    pub columns: Vec<String>,
    pub query_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FormCommandRow {
    pub name: String,
    pub title: String,
    pub action: String,
    pub shortcut: String,
}

#[derive(Debug, Serialize)]
pub struct FormTreeItem {
    pub depth: i64,
    pub name: String,
    pub item_type: String,
    pub data_path: String,
    pub title: String,
    pub visible: Option<bool>,
    pub enabled: Option<bool>,
    pub events: Vec<FormEventRow>,
}

#[derive(Debug, Serialize)]
pub struct FormStructure {
    pub object_name: String,
    pub form_name: String,
    pub form_kind: Option<String>,
    pub properties: serde_json::Value,
    pub events: Vec<FormEventRow>,
    pub attributes: Vec<FormAttributeRow>,
    pub commands: Vec<FormCommandRow>,
    /// Pre-order walk of the item tree, depth-annotated.
    pub items: Vec<FormTreeItem>,
    pub conditional_appearance: Option<String>,
}

/// Full structure of one form; the item tree is rebuilt from (id, parent_id)
/// as a depth-annotated pre-order walk in insertion order.
pub async fn form_structure(
    pool: &SqlitePool,
    object: &str,
    form: &str,
) -> Result<Option<FormStructure>> {
    let Some(row) = sqlx::query(
        r#"
        SELECT f.id, f.form_name, f.form_kind, f.properties_json, o.name AS object_name
        FROM forms f JOIN metadata_objects o ON o.id = f.object_id
        WHERE o.name = ? AND f.form_name = ?
        "#,
    )
    .bind(object)
    .bind(form)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };
    let form_id: i64 = row.get("id");

    let properties_json: String = row.get("properties_json");
    let properties = serde_json::from_str(&properties_json).unwrap_or(serde_json::Value::Null);

    let events = sqlx::query(
        "SELECT event_name, handler, call_type FROM form_events WHERE form_id = ? ORDER BY id",
    )
    .bind(form_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(form_event_row)
    .collect();

    let mut attributes = Vec::new();
    for attr in sqlx::query(
        "SELECT name, type, title, is_main, columns_json, query_text
         FROM form_attributes WHERE form_id = ? ORDER BY id",
    )
    .bind(form_id)
    .fetch_all(pool)
    .await?
    {
        let columns_json: Option<String> = attr.get("columns_json");
        let columns = columns_json
            .as_deref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default();
        attributes.push(FormAttributeRow {
            name: attr.get("name"),
            attribute_type: attr.get("type"),
            title: attr.get("title"),
            is_main: attr.get("is_main"),
            columns,
            query_text: attr.get("query_text"),
        });
    }

    let commands = sqlx::query(
        "SELECT name, title, action, shortcut FROM form_commands WHERE form_id = ? ORDER BY id",
    )
    .bind(form_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|c| FormCommandRow {
        name: c.get("name"),
        title: c.get("title"),
        action: c.get("action"),
        shortcut: c.get("shortcut"),
    })
    .collect();

    let item_rows = sqlx::query(
        "SELECT id, parent_id, name, item_type, data_path, title, visible, enabled
         FROM form_items WHERE form_id = ? ORDER BY id",
    )
    .bind(form_id)
    .fetch_all(pool)
    .await?;

    let mut depths: HashMap<i64, i64> = HashMap::new();
    let mut items = Vec::with_capacity(item_rows.len());
    for item in &item_rows {
        let id: i64 = item.get("id");
        let parent_id: Option<i64> = item.get("parent_id");
        let depth = parent_id
            .and_then(|p| depths.get(&p).copied())
            .map(|d| d + 1)
            .unwrap_or(0);
        depths.insert(id, depth);

        let item_events = sqlx::query(
            "SELECT event_name, handler, call_type FROM form_item_events
             WHERE form_item_id = ? ORDER BY id",
        )
        .bind(id)
        .fetch_all(pool)
        .await?
        .iter()
        .map(form_event_row)
        .collect();

        items.push(FormTreeItem {
            depth,
            name: item.get("name"),
            item_type: item.get("item_type"),
            data_path: item.get("data_path"),
            title: item.get("title"),
            visible: item.get("visible"),
            enabled: item.get("enabled"),
            events: item_events,
        });
    }

    let conditional_appearance = sqlx::query(
        "SELECT content FROM form_conditional_appearance WHERE form_id = ?",
    )
    .bind(form_id)
    .fetch_optional(pool)
    .await?
    .map(|r| r.get("content"));

    Ok(Some(FormStructure {
        object_name: row.get("object_name"),
        form_name: row.get("form_name"),
        form_kind: row.get("form_kind"),
        properties,
        events,
        attributes,
        commands,
        items,
        conditional_appearance,
    }))
}

fn form_event_row(row: &sqlx::sqlite::SqliteRow) -> FormEventRow {
    FormEventRow {
        event_name: row.get("event_name"),
        handler: row.get("handler"),
        call_type: row.get("call_type"),
    }
}

#[derive(Debug, Serialize)]
pub struct FormElementHit {
    pub object_name: String,
    pub form_name: String,
    pub name: String,
    pub item_type: String,
    pub data_path: String,
}

/// Form items matched by name and/or data path, optionally narrowed to one
/// owning object.
pub async fn find_form_elements(
    pool: &SqlitePool,
    element: Option<&str>,
    data_path: Option<&str>,
    object: Option<&str>,
    limit: i64,
) -> Result<Vec<FormElementHit>> {
    let mut sql = String::from(
        r#"
        SELECT o.name AS object_name, f.form_name, i.name, i.item_type, i.data_path
        FROM form_items i
        JOIN forms f ON f.id = i.form_id
        JOIN metadata_objects o ON o.id = f.object_id
        WHERE 1=1
        "#,
    );
    if element.is_some() {
        sql.push_str(" AND i.name LIKE ?");
    }
    if data_path.is_some() {
        sql.push_str(" AND i.data_path LIKE ?");
    }
    if object.is_some() {
        sql.push_str(" AND o.name LIKE ?");
    }
    sql.push_str(" ORDER BY o.name, f.form_name, i.id LIMIT ?");

    let mut q = sqlx::query(&sql);
    if let Some(element) = element {
        q = q.bind(like_pattern(element));
    }
    if let Some(data_path) = data_path {
        q = q.bind(like_pattern(data_path));
    }
    if let Some(object) = object {
        q = q.bind(like_pattern(object));
    }

    Ok(q.bind(limit)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| FormElementHit {
            object_name: row.get("object_name"),
            form_name: row.get("form_name"),
            name: row.get("name"),
            item_type: row.get("item_type"),
            data_path: row.get("data_path"),
        })
        .collect())
}

#[derive(Debug, Serialize)]
pub struct OptionUsage {
    pub option_name: String,
    pub location_constant: String,
    pub element_type: Option<String>,
    pub element_name: Option<String>,
    pub form_name: Option<String>,
}

/// Functional options gating an object (through their content) and, when a
/// form element is named, the options bound to that element.
pub async fn functional_options(
    pool: &SqlitePool,
    object: &str,
    element_name: Option<&str>,
) -> Result<Vec<OptionUsage>> {
    let rows = if let Some(element) = element_name {
        sqlx::query(
            r#"
            SELECT fo_obj.name AS option_name, fo.location_constant,
                   u.element_type, u.element_name, f.form_name
            FROM fo_form_usage u
            JOIN functional_options fo ON fo.id = u.functional_option_id
            JOIN metadata_objects fo_obj ON fo_obj.id = fo.object_id
            JOIN metadata_objects owner ON owner.id = u.owner_object_id
            LEFT JOIN forms f ON f.id = u.form_id
            WHERE owner.name = ? AND u.element_name LIKE ?
            ORDER BY u.id
            "#,
        )
        .bind(object)
        .bind(like_pattern(element))
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query(
            r#"
            SELECT fo_obj.name AS option_name, fo.location_constant,
                   NULL AS element_type, r.element_name, NULL AS form_name
            FROM fo_content_ref r
            JOIN functional_options fo ON fo.id = r.functional_option_id
            JOIN metadata_objects fo_obj ON fo_obj.id = fo.object_id
            JOIN metadata_objects target ON target.id = r.metadata_object_id
            WHERE target.name = ?
            ORDER BY r.id
            "#,
        )
        .bind(object)
        .fetch_all(pool)
        .await?
    };

    Ok(rows
        .iter()
        .map(|row| OptionUsage {
            option_name: row.get("option_name"),
            location_constant: row.get("location_constant"),
            element_type: row.get("element_type"),
            element_name: row.get("element_name"),
            form_name: row.get("form_name"),
        })
        .collect())
}

#[derive(Debug, Serialize)]
pub struct AttributeHit {
    pub object_type: String,
    pub object_name: String,
    pub name: String,
    pub attribute_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tabular_section: Option<String>,
}

/// Attribute lookup across object attributes and tabular-section columns.
pub async fn find_attributes(pool: &SqlitePool, name: &str, limit: i64) -> Result<Vec<AttributeHit>> {
    let pattern = like_pattern(name);

    let mut hits: Vec<AttributeHit> = sqlx::query(
        r#"
        SELECT o.object_type, o.name AS object_name, a.name, a.attribute_type
        FROM attributes a JOIN metadata_objects o ON o.id = a.object_id
        WHERE a.name LIKE ?
        ORDER BY o.name, a.id
        LIMIT ?
        "#,
    )
    .bind(&pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| AttributeHit {
        object_type: row.get("object_type"),
        object_name: row.get("object_name"),
        name: row.get("name"),
        attribute_type: row.get("attribute_type"),
        tabular_section: None,
    })
    .collect();

    let remaining = limit - hits.len() as i64;
    if remaining > 0 {
        let columns = sqlx::query(
            r#"
            SELECT o.object_type, o.name AS object_name, c.column_name AS name,
                   c.column_type AS attribute_type, ts.name AS tabular_section
            FROM tabular_section_columns c
            JOIN tabular_sections ts ON ts.id = c.tabular_section_id
            JOIN metadata_objects o ON o.id = ts.object_id
            WHERE c.column_name LIKE ?
            ORDER BY o.name, c.id
            LIMIT ?
            "#,
        )
        .bind(&pattern)
        .bind(remaining)
        .fetch_all(pool)
        .await?;
        for row in &columns {
            hits.push(AttributeHit {
                object_type: row.get("object_type"),
                object_name: row.get("object_name"),
                name: row.get("name"),
                attribute_type: row.get("attribute_type"),
                tabular_section: row.get("tabular_section"),
            });
        }
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_safety_check() {
        assert!(is_fts_safe("ОбработатьДанные"));
        assert!(is_fts_safe("слово другое"));
        assert!(!is_fts_safe("Справочники.Контрагенты"));
        assert!(!is_fts_safe("Вызов(Параметр)"));
        assert!(!is_fts_safe("\"в кавычках\""));
    }

    #[test]
    fn snippet_is_line_bounded() {
        let code = "a\nb\nc\nискомое слово\nd\ne\nf";
        let (line, snippet) = snippet_around(code, "искомое");
        assert_eq!(line, 4);
        assert_eq!(snippet, "b\nc\nискомое слово\nd\ne");
    }

    #[test]
    fn snippet_falls_back_to_head() {
        let (line, snippet) = snippet_around("один\nдва", "нет");
        assert_eq!(line, 1);
        assert_eq!(snippet, "один\nдва");
    }
}
