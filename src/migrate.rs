use anyhow::Result;
use sqlx::SqlitePool;

/// Creates the index schema. Every statement is idempotent, so running this
/// against an existing database is a no-op.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metadata_objects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL DEFAULT '',
            object_type TEXT NOT NULL,
            name TEXT NOT NULL,
            synonym TEXT NOT NULL DEFAULT '',
            comment TEXT NOT NULL DEFAULT '',
            object_belonging TEXT,
            extended_configuration_object TEXT,
            UNIQUE(object_type, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS modules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            object_id INTEGER NOT NULL,
            form_id INTEGER,
            object_name TEXT NOT NULL,
            module_type TEXT NOT NULL,
            code TEXT NOT NULL,
            FOREIGN KEY (object_id) REFERENCES metadata_objects(id),
            FOREIGN KEY (form_id) REFERENCES forms(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS module_procedures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            module_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            proc_type TEXT NOT NULL,
            params TEXT NOT NULL DEFAULT '',
            is_export INTEGER NOT NULL DEFAULT 0,
            start_line INTEGER NOT NULL,
            end_line INTEGER,
            execution_context TEXT,
            extension_call_type TEXT,
            FOREIGN KEY (module_id) REFERENCES modules(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attributes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            object_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            attribute_type TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            comment TEXT NOT NULL DEFAULT '',
            is_standard INTEGER NOT NULL DEFAULT 0,
            standard_type TEXT,
            section TEXT NOT NULL DEFAULT 'Attribute',
            FOREIGN KEY (object_id) REFERENCES metadata_objects(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tabular_sections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            object_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            comment TEXT NOT NULL DEFAULT '',
            FOREIGN KEY (object_id) REFERENCES metadata_objects(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tabular_section_columns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tabular_section_id INTEGER NOT NULL,
            column_name TEXT NOT NULL,
            column_type TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            comment TEXT NOT NULL DEFAULT '',
            FOREIGN KEY (tabular_section_id) REFERENCES tabular_sections(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enum_values (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            object_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            enum_order INTEGER,
            title TEXT NOT NULL DEFAULT '',
            comment TEXT NOT NULL DEFAULT '',
            object_belonging TEXT,
            extended_configuration_object TEXT,
            FOREIGN KEY (object_id) REFERENCES metadata_objects(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS forms (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            object_id INTEGER NOT NULL,
            form_name TEXT NOT NULL,
            uuid TEXT NOT NULL DEFAULT '',
            form_kind TEXT,
            properties_json TEXT NOT NULL DEFAULT '{}',
            FOREIGN KEY (object_id) REFERENCES metadata_objects(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS form_attributes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            form_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            type TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            is_main INTEGER NOT NULL DEFAULT 0,
            columns_json TEXT,
            query_text TEXT,
            FOREIGN KEY (form_id) REFERENCES forms(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS form_commands (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            form_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            action TEXT NOT NULL DEFAULT '',
            shortcut TEXT NOT NULL DEFAULT '',
            representation TEXT NOT NULL DEFAULT '',
            FOREIGN KEY (form_id) REFERENCES forms(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS form_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            form_id INTEGER NOT NULL,
            event_name TEXT NOT NULL,
            handler TEXT NOT NULL DEFAULT '',
            call_type TEXT,
            FOREIGN KEY (form_id) REFERENCES forms(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS form_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            form_id INTEGER NOT NULL,
            parent_id INTEGER,
            name TEXT NOT NULL DEFAULT '',
            item_type TEXT NOT NULL,
            data_path TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            visible INTEGER,
            enabled INTEGER,
            FOREIGN KEY (form_id) REFERENCES forms(id),
            FOREIGN KEY (parent_id) REFERENCES form_items(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS form_item_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            form_item_id INTEGER NOT NULL,
            event_name TEXT NOT NULL,
            handler TEXT NOT NULL DEFAULT '',
            call_type TEXT,
            FOREIGN KEY (form_item_id) REFERENCES form_items(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS form_conditional_appearance (
            form_id INTEGER PRIMARY KEY,
            content TEXT NOT NULL,
            FOREIGN KEY (form_id) REFERENCES forms(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS functional_options (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            object_id INTEGER NOT NULL UNIQUE,
            location_constant TEXT NOT NULL DEFAULT '',
            privileged_get_mode INTEGER,
            FOREIGN KEY (object_id) REFERENCES metadata_objects(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fo_content_ref (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            functional_option_id INTEGER NOT NULL,
            metadata_object_id INTEGER NOT NULL,
            content_ref_type TEXT NOT NULL,
            tabular_section_name TEXT,
            element_name TEXT,
            FOREIGN KEY (functional_option_id) REFERENCES functional_options(id),
            FOREIGN KEY (metadata_object_id) REFERENCES metadata_objects(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fo_form_usage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            functional_option_id INTEGER NOT NULL,
            owner_object_id INTEGER NOT NULL,
            form_id INTEGER,
            element_type TEXT NOT NULL,
            element_name TEXT NOT NULL,
            FOREIGN KEY (functional_option_id) REFERENCES functional_options(id),
            FOREIGN KEY (owner_object_id) REFERENCES metadata_objects(id),
            FOREIGN KEY (form_id) REFERENCES forms(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 over module source, external content. CREATE VIRTUAL TABLE is not
    // idempotent natively, so we check first.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='code_search'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE code_search USING fts5(
                object_name,
                module_type UNINDEXED,
                code,
                content='modules',
                content_rowid='id'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_objects_name ON metadata_objects(name)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_objects_type ON metadata_objects(object_type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_modules_object_id ON modules(object_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_form_items_form_id ON form_items(form_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_attributes_object_id ON attributes(object_id)")
        .execute(pool)
        .await?;

    Ok(())
}
