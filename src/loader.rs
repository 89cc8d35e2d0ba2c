//! Entity Loader: writes parsed entities into SQLite.
//!
//! A run is two transactions. Pass 1 clears every table, then loads objects,
//! their own modules and procedures, attributes, tabular sections, enum
//! values, and functional-option definitions; `commit_pass1` makes those
//! visible. Pass 2 loads forms, form contents, form modules, and the
//! resolved functional-option references; `commit_pass2` finishes the run.
//! FTS rows are written in the same transaction as their module row.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::models::{
    FormElementType, ModuleType, ParsedAttribute, ParsedEnumValue, ParsedForm,
    ParsedFunctionalOption, ParsedObject, ParsedTabularSection, ProcedureDecl,
};
use crate::resolver::ResolvedContentRef;

pub struct EntityLoader {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
}

// Referencing tables first: modules points at forms through form_id, so it
// must be emptied before forms; everything points at metadata_objects, which
// goes last.
const CLEARED_TABLES: [&str; 17] = [
    "fo_form_usage",
    "fo_content_ref",
    "functional_options",
    "module_procedures",
    "modules",
    "form_conditional_appearance",
    "form_item_events",
    "form_items",
    "form_events",
    "form_commands",
    "form_attributes",
    "forms",
    "enum_values",
    "tabular_section_columns",
    "tabular_sections",
    "attributes",
    "metadata_objects",
];

impl EntityLoader {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, tx: None }
    }

    fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>> {
        self.tx
            .as_mut()
            .ok_or_else(|| anyhow!("loader has no active transaction"))
    }

    /// Opens the pass-1 transaction and clears all previous run data inside
    /// it, so a failed run never leaves a half-emptied database behind.
    pub async fn begin_run(&mut self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO code_search(code_search) VALUES('delete-all')")
            .execute(&mut *tx)
            .await?;
        // form_items references itself through parent_id; a bulk DELETE can
        // drop a parent row before its children, so detach the links first.
        sqlx::query("UPDATE form_items SET parent_id = NULL")
            .execute(&mut *tx)
            .await?;
        for table in CLEARED_TABLES {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        self.tx = Some(tx);
        Ok(())
    }

    pub async fn commit_pass1(&mut self) -> Result<()> {
        self.commit().await
    }

    pub async fn begin_pass2(&mut self) -> Result<()> {
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    pub async fn commit_pass2(&mut self) -> Result<()> {
        self.commit().await
    }

    async fn commit(&mut self) -> Result<()> {
        self.tx
            .take()
            .ok_or_else(|| anyhow!("loader has no active transaction"))?
            .commit()
            .await?;
        Ok(())
    }

    pub async fn insert_object(&mut self, object: &ParsedObject) -> Result<i64> {
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"
            INSERT INTO metadata_objects
                (uuid, object_type, name, synonym, comment,
                 object_belonging, extended_configuration_object)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&object.uuid)
        .bind(object.object_type.as_str())
        .bind(&object.name)
        .bind(&object.synonym)
        .bind(&object.comment)
        .bind(object.belonging.map(|b| b.as_str()))
        .bind(object.extended_ref.as_deref())
        .execute(&mut **tx)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Inserts a module row and its FTS shadow row in the same transaction.
    pub async fn insert_module(
        &mut self,
        object_id: i64,
        form_id: Option<i64>,
        object_name: &str,
        module_type: ModuleType,
        code: &str,
    ) -> Result<i64> {
        let tx = self.tx()?;
        let result = sqlx::query(
            "INSERT INTO modules (object_id, form_id, object_name, module_type, code)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(object_id)
        .bind(form_id)
        .bind(object_name)
        .bind(module_type.as_str())
        .bind(code)
        .execute(&mut **tx)
        .await?;
        let module_id = result.last_insert_rowid();

        sqlx::query(
            "INSERT INTO code_search (rowid, object_name, module_type, code)
             VALUES (?, ?, ?, ?)",
        )
        .bind(module_id)
        .bind(object_name)
        .bind(module_type.as_str())
        .bind(code)
        .execute(&mut **tx)
        .await?;

        Ok(module_id)
    }

    pub async fn insert_procedures(
        &mut self,
        module_id: i64,
        decls: &[ProcedureDecl],
    ) -> Result<()> {
        let tx = self.tx()?;
        for decl in decls {
            sqlx::query(
                r#"
                INSERT INTO module_procedures
                    (module_id, name, proc_type, params, is_export,
                     start_line, end_line, execution_context, extension_call_type)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(module_id)
            .bind(&decl.name)
            .bind(decl.kind.as_str())
            .bind(&decl.params)
            .bind(decl.is_export)
            .bind(decl.start_line)
            .bind(decl.end_line)
            .bind(decl.execution_context.map(|c| c.as_str()))
            .bind(decl.extension_call_type.map(|c| c.as_str()))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub async fn insert_attribute(
        &mut self,
        object_id: i64,
        attribute: &ParsedAttribute,
    ) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO attributes
                (object_id, name, attribute_type, title, comment,
                 is_standard, standard_type, section)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(object_id)
        .bind(&attribute.name)
        .bind(&attribute.attribute_type)
        .bind(&attribute.title)
        .bind(&attribute.comment)
        .bind(attribute.is_standard)
        .bind(attribute.standard_type.as_deref())
        .bind(attribute.section.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn insert_tabular_section(
        &mut self,
        object_id: i64,
        section: &ParsedTabularSection,
    ) -> Result<()> {
        let tx = self.tx()?;
        let result = sqlx::query(
            "INSERT INTO tabular_sections (object_id, name, title, comment)
             VALUES (?, ?, ?, ?)",
        )
        .bind(object_id)
        .bind(&section.name)
        .bind(&section.title)
        .bind(&section.comment)
        .execute(&mut **tx)
        .await?;
        let section_id = result.last_insert_rowid();

        for column in &section.columns {
            sqlx::query(
                r#"
                INSERT INTO tabular_section_columns
                    (tabular_section_id, column_name, column_type, title, comment)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(section_id)
            .bind(&column.name)
            .bind(&column.column_type)
            .bind(&column.title)
            .bind(&column.comment)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub async fn insert_enum_value(
        &mut self,
        object_id: i64,
        value: &ParsedEnumValue,
    ) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO enum_values
                (object_id, name, enum_order, title, comment,
                 object_belonging, extended_configuration_object)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(object_id)
        .bind(&value.name)
        .bind(value.order)
        .bind(&value.title)
        .bind(&value.comment)
        .bind(value.belonging.map(|b| b.as_str()))
        .bind(value.extended_ref.as_deref())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn insert_functional_option(
        &mut self,
        object_id: i64,
        option: &ParsedFunctionalOption,
    ) -> Result<i64> {
        let tx = self.tx()?;
        let result = sqlx::query(
            "INSERT INTO functional_options (object_id, location_constant, privileged_get_mode)
             VALUES (?, ?, ?)",
        )
        .bind(object_id)
        .bind(&option.location_constant)
        .bind(option.privileged_get_mode)
        .execute(&mut **tx)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Inserts a form with all of its declared contents. The flat item arena
    /// is written in traversal order, remapping local ids to row ids as the
    /// rows land (parents always precede children in the arena).
    pub async fn insert_form(&mut self, object_id: i64, form: &ParsedForm) -> Result<i64> {
        let properties_json = serde_json::to_string(&form.properties)?;
        let tx = self.tx()?;

        let result = sqlx::query(
            "INSERT INTO forms (object_id, form_name, uuid, form_kind, properties_json)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(object_id)
        .bind(&form.name)
        .bind(&form.uuid)
        .bind(form.kind.map(|k| k.as_str()))
        .bind(&properties_json)
        .execute(&mut **tx)
        .await?;
        let form_id = result.last_insert_rowid();

        for event in &form.events {
            sqlx::query(
                "INSERT INTO form_events (form_id, event_name, handler, call_type)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(form_id)
            .bind(&event.event_name)
            .bind(&event.handler)
            .bind(event.call_type.as_deref())
            .execute(&mut **tx)
            .await?;
        }

        for attribute in &form.attributes {
            let columns_json = if attribute.columns.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&attribute.columns)?)
            };
            sqlx::query(
                r#"
                INSERT INTO form_attributes
                    (form_id, name, type, title, is_main, columns_json, query_text)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(form_id)
            .bind(&attribute.name)
            .bind(&attribute.attr_type)
            .bind(&attribute.title)
            .bind(attribute.is_main)
            .bind(columns_json)
            .bind(attribute.query_text.as_deref())
            .execute(&mut **tx)
            .await?;
        }

        for command in &form.commands {
            sqlx::query(
                r#"
                INSERT INTO form_commands
                    (form_id, name, title, action, shortcut, representation)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(form_id)
            .bind(&command.name)
            .bind(&command.title)
            .bind(&command.action)
            .bind(&command.shortcut)
            .bind(&command.representation)
            .execute(&mut **tx)
            .await?;
        }

        let mut row_ids: HashMap<i64, i64> = HashMap::new();
        for item in &form.items {
            let parent_row_id = match item.parent_local_id {
                Some(local) => row_ids.get(&local).copied(),
                None => None,
            };
            let result = sqlx::query(
                r#"
                INSERT INTO form_items
                    (form_id, parent_id, name, item_type, data_path, title, visible, enabled)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(form_id)
            .bind(parent_row_id)
            .bind(&item.name)
            .bind(&item.item_type)
            .bind(&item.data_path)
            .bind(&item.title)
            .bind(item.visible)
            .bind(item.enabled)
            .execute(&mut **tx)
            .await?;
            let item_row_id = result.last_insert_rowid();
            row_ids.insert(item.local_id, item_row_id);

            for event in &item.events {
                sqlx::query(
                    "INSERT INTO form_item_events (form_item_id, event_name, handler, call_type)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(item_row_id)
                .bind(&event.event_name)
                .bind(&event.handler)
                .bind(event.call_type.as_deref())
                .execute(&mut **tx)
                .await?;
            }
        }

        if let Some(content) = &form.conditional_appearance {
            sqlx::query("INSERT INTO form_conditional_appearance (form_id, content) VALUES (?, ?)")
                .bind(form_id)
                .bind(content)
                .execute(&mut **tx)
                .await?;
        }

        Ok(form_id)
    }

    pub async fn insert_content_ref(
        &mut self,
        functional_option_id: i64,
        content_ref: &ResolvedContentRef,
    ) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO fo_content_ref
                (functional_option_id, metadata_object_id, content_ref_type,
                 tabular_section_name, element_name)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(functional_option_id)
        .bind(content_ref.metadata_object_id)
        .bind(content_ref.ref_type.as_str())
        .bind(content_ref.tabular_section.as_deref())
        .bind(content_ref.element_name.as_deref())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn insert_form_usage(
        &mut self,
        functional_option_id: i64,
        owner_object_id: i64,
        form_id: Option<i64>,
        element_type: FormElementType,
        element_name: &str,
    ) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO fo_form_usage
                (functional_option_id, owner_object_id, form_id, element_type, element_name)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(functional_option_id)
        .bind(owner_object_id)
        .bind(form_id)
        .bind(element_type.as_str())
        .bind(element_name)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
