//! End-to-end ingestion tests over a synthetic configuration export.
//!
//! Builds a small export tree in a temp directory (catalog with form and
//! object module, common module, enum, functional option, plus one declared
//! object whose file is missing), ingests it, and checks the report and the
//! query layer against it.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use onec_index::ingest::run_ingest;
use onec_index::models::ModuleType;
use onec_index::progress::NoProgress;
use onec_index::query;
use onec_index::{db, ingest};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn build_export(root: &Path) {
    write(
        root,
        "Configuration.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <Configuration uuid="00000000-0000-0000-0000-000000000001">
    <Properties>
      <Name>ТестоваяКонфигурация</Name>
    </Properties>
    <ChildObjects>
      <Catalog>Контрагенты</Catalog>
      <Document>РеализацияТоваров</Document>
      <CommonModule>ОбщегоНазначения</CommonModule>
      <Enum>ВидыЦен</Enum>
      <FunctionalOption>ИспользоватьСкидки</FunctionalOption>
    </ChildObjects>
  </Configuration>
</MetaDataObject>"#,
    );

    // Document РеализацияТоваров is declared but has no file: a skip.

    write(
        root,
        "Catalogs/Контрагенты.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <Catalog uuid="aaaa-0001">
    <Properties>
      <Name>Контрагенты</Name>
      <Synonym><item><lang>ru</lang><content>Контрагенты</content></item></Synonym>
      <DefaultListForm>Catalog.Контрагенты.Form.ФормаСписка</DefaultListForm>
      <StandardAttributes>
        <StandardAttribute name="Code"/>
      </StandardAttributes>
    </Properties>
    <ChildObjects>
      <Attribute uuid="a1">
        <Properties>
          <Name>ИНН</Name>
          <Type><Type>xs:string</Type></Type>
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
      <Form>ФормаСписка</Form>
    </ChildObjects>
  </Catalog>
</MetaDataObject>"#,
    );

    write(
        root,
        "Catalogs/Контрагенты/Ext/ObjectModule.bsl",
        "&НаСервере\n\
         Процедура ПриЗаписи(Отказ) Экспорт\n\
         \tНаценка = РассчитатьНаценку(100);\n\
         КонецПроцедуры\n",
    );

    write(
        root,
        "Catalogs/Контрагенты/Forms/ФормаСписка.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <Form uuid="ffff-0001">
    <Properties><Name>ФормаСписка</Name></Properties>
  </Form>
</MetaDataObject>"#,
    );

    write(
        root,
        "Catalogs/Контрагенты/Forms/ФормаСписка/Ext/Form.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Form xmlns="http://v8.1c.ru/8.3/xcf/logform">
  <Title><item><lang>ru</lang><content>Контрагенты</content></item></Title>
  <ChildItems>
    <Table name="Список" id="1">
      <ChildItems>
        <InputField name="ПолеИНН" id="2">
          <DataPath>Список.ИНН</DataPath>
          <FunctionalOptions><Item>ИспользоватьСкидки</Item></FunctionalOptions>
        </InputField>
      </ChildItems>
    </Table>
  </ChildItems>
</Form>"#,
    );

    write(
        root,
        "Catalogs/Контрагенты/Forms/ФормаСписка/Ext/Form/Module.bsl",
        "&НаКлиенте\n\
         Процедура ПриОткрытии(Отказ)\n\
         КонецПроцедуры\n",
    );

    write(
        root,
        "CommonModules/ОбщегоНазначения.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <CommonModule uuid="cccc-0001">
    <Properties><Name>ОбщегоНазначения</Name></Properties>
  </CommonModule>
</MetaDataObject>"#,
    );

    write(
        root,
        "CommonModules/ОбщегоНазначения/Ext/Module.bsl",
        "Функция РассчитатьНаценку(Сумма) Экспорт\n\
         \tВозврат Сумма * 1.2;\n\
         КонецФункции\n",
    );

    write(
        root,
        "Enums/ВидыЦен.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <Enum uuid="eeee-0001">
    <Properties><Name>ВидыЦен</Name></Properties>
    <EnumValues>
      <EnumValue uuid="v1"><Properties><Name>Оптовая</Name></Properties></EnumValue>
      <EnumValue uuid="v2"><Properties><Name>Розничная</Name></Properties></EnumValue>
    </EnumValues>
  </Enum>
</MetaDataObject>"#,
    );

    write(
        root,
        "FunctionalOptions/ИспользоватьСкидки.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <FunctionalOption uuid="ffff-1000">
    <Properties>
      <Name>ИспользоватьСкидки</Name>
      <Location>Constant.ИспользоватьСкидки</Location>
      <Content>
        <Item>Catalog.Контрагенты</Item>
        <Item>Catalog.Контрагенты.Attribute.ИНН</Item>
        <Item>Catalog.Несуществующий</Item>
      </Content>
    </Properties>
  </FunctionalOption>
</MetaDataObject>"#,
    );
}

async fn ingest_fixture(tmp: &TempDir) -> (sqlx::SqlitePool, ingest::IngestReport) {
    let export = tmp.path().join("export");
    build_export(&export);
    let pool = db::connect(&tmp.path().join("index.db")).await.unwrap();
    let report = run_ingest(&pool, &export, &NoProgress).await.unwrap();
    (pool, report)
}

#[tokio::test]
async fn report_counts_the_whole_export() {
    let tmp = TempDir::new().unwrap();
    let (pool, report) = ingest_fixture(&tmp).await;

    assert_eq!(report.configuration_name, "ТестоваяКонфигурация");
    assert_eq!(report.objects, 4);
    assert_eq!(report.modules, 3); // object module, form module, common module
    assert_eq!(report.procedures, 3);
    assert_eq!(report.forms, 1);
    assert_eq!(report.content_refs, 2);
    assert_eq!(report.dropped_refs, 1); // Catalog.Несуществующий
    assert_eq!(report.form_usages, 1);

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].item, "Document.РеализацияТоваров");

    pool.close().await;
}

#[tokio::test]
async fn reingest_rebuilds_from_scratch() {
    let tmp = TempDir::new().unwrap();
    let (pool, first) = ingest_fixture(&tmp).await;
    let report = run_ingest(&pool, &tmp.path().join("export"), &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.objects, first.objects);
    assert_eq!(report.modules, first.modules);
    assert_eq!(report.forms, first.forms);

    let groups = query::list_objects(&pool, None, 50).await.unwrap();
    let total: i64 = groups.iter().map(|g| g.total).sum();
    assert_eq!(total, 4);

    // No rows survive from the first run.
    let hits = query::find_attributes(&pool, "ИНН", 10).await.unwrap();
    assert_eq!(hits.len(), 1);

    pool.close().await;
}

#[tokio::test]
async fn code_search_hits_definition_and_call_site() {
    let tmp = TempDir::new().unwrap();
    let (pool, _) = ingest_fixture(&tmp).await;

    let hits = query::search_code(&pool, "РассчитатьНаценку", None, None, 10)
        .await
        .unwrap();
    let objects: Vec<&str> = hits.iter().map(|h| h.object_name.as_str()).collect();
    assert!(objects.contains(&"ОбщегоНазначения"));
    assert!(objects.contains(&"Контрагенты"));

    // Filter forces the LIKE path.
    let filtered = query::search_code(
        &pool,
        "РассчитатьНаценку",
        Some("Общего"),
        Some(ModuleType::Common),
        10,
    )
    .await
    .unwrap();
    assert_eq!(filtered.len(), 1);
    assert!(filtered[0].snippet.contains("Возврат"));

    pool.close().await;
}

#[tokio::test]
async fn object_structure_resolves_exact_then_partial() {
    let tmp = TempDir::new().unwrap();
    let (pool, _) = ingest_fixture(&tmp).await;

    let query::StructureResult::Object(full) =
        query::object_structure(&pool, "Контрагенты").await.unwrap()
    else {
        panic!("expected object structure");
    };
    assert_eq!(full.summary.object_type, "Catalog");
    assert!(full.attributes.iter().any(|a| a.name == "ИНН"));
    assert!(full.attributes.iter().any(|a| a.is_standard && a.name == "Code"));
    assert_eq!(full.tabular_sections.len(), 1);
    assert_eq!(full.tabular_sections[0].columns[0].name, "ФИО");
    assert_eq!(full.summary.forms.len(), 1);

    // Partial match with a single hit resolves too.
    let partial = query::object_structure(&pool, "Контраг").await.unwrap();
    assert!(matches!(partial, query::StructureResult::Object(_)));

    let missing = query::object_structure(&pool, "НетТакого").await.unwrap();
    assert!(matches!(missing, query::StructureResult::NotFound));

    pool.close().await;
}

#[tokio::test]
async fn functional_option_structure_lists_resolved_content() {
    let tmp = TempDir::new().unwrap();
    let (pool, _) = ingest_fixture(&tmp).await;

    let query::StructureResult::FunctionalOption(fo) =
        query::object_structure(&pool, "ИспользоватьСкидки")
            .await
            .unwrap()
    else {
        panic!("expected functional option structure");
    };
    assert_eq!(fo.location_constant, "ИспользоватьСкидки");
    assert_eq!(fo.content.len(), 2);
    assert!(fo
        .content
        .iter()
        .any(|c| c.content_ref_type == "Attribute" && c.element_name.as_deref() == Some("ИНН")));

    assert_eq!(fo.usages.len(), 1);
    assert_eq!(fo.usages[0].object_name, "Контрагенты");
    assert_eq!(fo.usages[0].form_name.as_deref(), Some("ФормаСписка"));
    assert_eq!(fo.usages[0].element_type, "FormItem");
    assert_eq!(fo.usages[0].element_name, "ПолеИНН");

    pool.close().await;
}

#[tokio::test]
async fn unreadable_module_file_loses_only_that_module() {
    let tmp = TempDir::new().unwrap();
    let export = tmp.path().join("export");
    build_export(&export);
    // CP1251 bytes: not valid UTF-8, so the module read fails.
    let module_path = export.join("Catalogs/Контрагенты/Ext/ObjectModule.bsl");
    fs::write(&module_path, [0xCF, 0xF0, 0xEE, 0xF6, 0xE5, 0xE4, 0xF3, 0xF0, 0xE0]).unwrap();

    let pool = db::connect(&tmp.path().join("index.db")).await.unwrap();
    let report = run_ingest(&pool, &export, &NoProgress).await.unwrap();

    assert_eq!(report.objects, 4);
    assert_eq!(report.modules, 2); // form module and common module survive
    assert!(report
        .skipped
        .iter()
        .any(|s| s.item == "Catalog.Контрагенты.Object"));

    // The rest of the catalog is still queryable.
    let structure = query::object_structure(&pool, "Контрагенты").await.unwrap();
    assert!(matches!(structure, query::StructureResult::Object(_)));

    pool.close().await;
}

#[tokio::test]
async fn enum_values_without_explicit_order_stay_unordered() {
    let tmp = TempDir::new().unwrap();
    let (pool, _) = ingest_fixture(&tmp).await;

    let query::StructureResult::Object(full) =
        query::object_structure(&pool, "ВидыЦен").await.unwrap()
    else {
        panic!("expected object structure");
    };
    assert_eq!(full.enum_values.len(), 2);
    assert_eq!(full.enum_values[0].name, "Оптовая");
    assert_eq!(full.enum_values[1].name, "Розничная");
    assert!(full.enum_values.iter().all(|v| v.enum_order.is_none()));

    pool.close().await;
}

#[tokio::test]
async fn procedures_keep_line_spans_and_directives() {
    let tmp = TempDir::new().unwrap();
    let (pool, _) = ingest_fixture(&tmp).await;

    let procs = query::module_procedures(&pool, "Контрагенты", ModuleType::Object, None)
        .await
        .unwrap();
    assert_eq!(procs.len(), 1);
    assert_eq!(procs[0].name, "ПриЗаписи");
    assert_eq!(procs[0].start_line, 1);
    assert_eq!(procs[0].end_line, Some(4));
    assert!(procs[0].is_export);
    assert_eq!(procs[0].execution_context.as_deref(), Some("Server"));

    let code = query::procedure_code(
        &pool,
        "ОбщегоНазначения",
        "РассчитатьНаценку",
        ModuleType::Common,
        None,
    )
    .await
    .unwrap()
    .unwrap();
    assert!(code.code.starts_with("Функция РассчитатьНаценку"));
    assert!(code.code.ends_with("КонецФункции"));

    pool.close().await;
}

#[tokio::test]
async fn form_structure_rebuilds_the_item_tree() {
    let tmp = TempDir::new().unwrap();
    let (pool, _) = ingest_fixture(&tmp).await;

    let form = query::form_structure(&pool, "Контрагенты", "ФормаСписка")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(form.form_kind.as_deref(), Some("List"));
    assert_eq!(
        form.properties.get("Title").and_then(|v| v.as_str()),
        Some("Контрагенты")
    );

    assert_eq!(form.items.len(), 2);
    assert_eq!(form.items[0].item_type, "Table");
    assert_eq!(form.items[0].depth, 0);
    assert_eq!(form.items[1].item_type, "InputField");
    assert_eq!(form.items[1].depth, 1);
    assert_eq!(form.items[1].data_path, "Список.ИНН");

    let elements = query::find_form_elements(&pool, Some("ПолеИНН"), None, None, 10)
        .await
        .unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].form_name, "ФормаСписка");

    // The form module landed as a Form module on the owning object.
    let form_procs =
        query::module_procedures(&pool, "Контрагенты", ModuleType::Form, Some("ФормаСписка"))
            .await
            .unwrap();
    assert_eq!(form_procs.len(), 1);
    assert_eq!(form_procs[0].execution_context.as_deref(), Some("Client"));

    pool.close().await;
}

#[tokio::test]
async fn options_and_attributes_cross_reference() {
    let tmp = TempDir::new().unwrap();
    let (pool, _) = ingest_fixture(&tmp).await;

    let gating = query::functional_options(&pool, "Контрагенты", None)
        .await
        .unwrap();
    assert_eq!(gating.len(), 2);
    assert!(gating.iter().all(|u| u.option_name == "ИспользоватьСкидки"));

    let bound = query::functional_options(&pool, "Контрагенты", Some("ПолеИНН"))
        .await
        .unwrap();
    assert_eq!(bound.len(), 1);
    assert_eq!(bound[0].element_type.as_deref(), Some("FormItem"));
    assert_eq!(bound[0].form_name.as_deref(), Some("ФормаСписка"));

    let hits = query::find_attributes(&pool, "ФИО", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].tabular_section.as_deref(), Some("КонтактныеЛица"));

    pool.close().await;
}

fn minimal_catalog(name: &str, uuid: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <Catalog uuid="{uuid}">
    <Properties><Name>{name}</Name></Properties>
  </Catalog>
</MetaDataObject>"#
    )
}

#[tokio::test]
async fn ambiguous_lookup_and_early_declared_option() {
    let tmp = TempDir::new().unwrap();
    let export = tmp.path().join("export");

    // The option is declared ahead of the catalogs its content points at;
    // resolution still finds them because it runs after all objects loaded.
    write(
        &export,
        "Configuration.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <Configuration uuid="00000000-0000-0000-0000-000000000002">
    <Properties><Name>Склад</Name></Properties>
    <ChildObjects>
      <FunctionalOption>УчетПоСкладам</FunctionalOption>
      <Catalog>Товары</Catalog>
      <Catalog>ТоварыНаСкладах</Catalog>
    </ChildObjects>
  </Configuration>
</MetaDataObject>"#,
    );
    write(
        &export,
        "Catalogs/Товары.xml",
        &minimal_catalog("Товары", "bbbb-0001"),
    );
    write(
        &export,
        "Catalogs/ТоварыНаСкладах.xml",
        &minimal_catalog("ТоварыНаСкладах", "bbbb-0002"),
    );
    write(
        &export,
        "FunctionalOptions/УчетПоСкладам.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaDataObject xmlns="http://v8.1c.ru/8.3/MDClasses">
  <FunctionalOption uuid="bbbb-1000">
    <Properties>
      <Name>УчетПоСкладам</Name>
      <Location>Constant.УчетПоСкладам</Location>
      <Content>
        <Item>Catalog.Товары</Item>
        <Item>Catalog.ТоварыНаСкладах</Item>
      </Content>
    </Properties>
  </FunctionalOption>
</MetaDataObject>"#,
    );

    let pool = db::connect(&tmp.path().join("index.db")).await.unwrap();
    let report = run_ingest(&pool, &export, &NoProgress).await.unwrap();

    assert_eq!(report.objects, 3);
    assert_eq!(report.content_refs, 2);
    assert_eq!(report.dropped_refs, 0);

    // A partial name matching both catalogs is never guessed at.
    let query::StructureResult::Ambiguous { candidates } =
        query::object_structure(&pool, "Товар").await.unwrap()
    else {
        panic!("expected ambiguous result");
    };
    assert_eq!(
        candidates,
        vec![
            "Catalog.Товары".to_string(),
            "Catalog.ТоварыНаСкладах".to_string()
        ]
    );

    // An exact name wins even when it prefixes another object.
    let exact = query::object_structure(&pool, "Товары").await.unwrap();
    assert!(matches!(exact, query::StructureResult::Object(_)));

    pool.close().await;
}
