//! Descriptor elements beyond plain values: unions, classes, plugins,
//! scripts and node insertion

mod common;

use cforms_binding::backend::{ElementTemplate, JsonModel};
use cforms_binding::binding::{
    BeanFactory, ChildBindings, CustomBinding, CustomBindingFactory, LoadScript, SaveScript,
    ScriptLibrary,
};
use cforms_binding::model::{Field, Group, Repeater, Union, Value};
use cforms_binding::path::PathContext;
use cforms_binding::{
    BindingConfig, BindingError, BindingManager, BindingResult, DescriptorBuilder,
    DescriptorSource, Path, Widget, XmlDocument,
};
use common::{build, descriptor};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn value_at(form: &Widget, path: &str) -> Option<Value> {
    form.lookup(path).and_then(Widget::value)
}

fn set(form: &mut Widget, path: &str, value: impl Into<Value>) {
    form.lookup_mut(path).unwrap().set_value(Some(value.into())).unwrap();
}

#[test]
fn test_union_binds_the_active_case() {
    let binding = build(
        r#"<fb:value id="contact" path="contact/@type"/>
           <fb:union id="contact" path="contact">
             <fb:case id="email"><fb:value id="address" path="email"/></fb:case>
             <fb:case id="phone"><fb:value id="number" path="phone"/></fb:case>
           </fb:union>"#,
    );
    let mut model = XmlDocument::parse(
        "person.xml",
        r#"<person><contact type="phone"><phone>555</phone></contact></person>"#,
    )
    .unwrap();
    let mut form: Widget = Group::new("form")
        .with(
            Union::new("contact")
                .with_case(Group::new("email").with(Field::new("address")))
                .with_case(Group::new("phone").with(Field::new("number"))),
        )
        .into();

    binding.load_form_from_model(&mut form, &mut model).unwrap();
    assert_eq!(value_at(&form, "contact"), Some(Value::from("phone")));
    assert_eq!(value_at(&form, "contact/phone/number"), Some(Value::from("555")));
    assert_eq!(value_at(&form, "contact/email/address"), None);

    set(&mut form, "contact", "email");
    set(&mut form, "contact/email/address", "ann@example.org");
    binding.save_form_to_model(&form, &mut model).unwrap();
    assert_eq!(
        model.to_xml_string(),
        r#"<person><contact type="email"><phone>555</phone><email>ann@example.org</email></contact></person>"#
    );
}

#[test]
fn test_union_requires_a_union_widget() {
    let binding = build(r#"<fb:union id="contact" path="."/>"#);
    let mut model = XmlDocument::parse("person.xml", "<person/>").unwrap();
    let mut form: Widget = Group::new("form").with(Field::new("contact")).into();
    let err = binding.load_form_from_model(&mut form, &mut model).unwrap_err();
    assert!(matches!(err, BindingError::WrongWidgetKind { expected: "union", .. }));
}

#[test]
fn test_classes_are_reused_by_new() {
    let binding = build(
        r#"<fb:group id="home" path="home"><fb:new id="address"/></fb:group>
           <fb:group id="work" path="work"><fb:new id="address"/></fb:group>
           <fb:class id="address">
             <fb:value id="city" path="city"/>
           </fb:class>"#,
    );
    let mut model = XmlDocument::parse(
        "person.xml",
        "<person><home><city>Gent</city></home><work><city>Brussel</city></work></person>",
    )
    .unwrap();
    let mut form: Widget = Group::new("form")
        .with(Group::new("home").with(Field::new("city")))
        .with(Group::new("work").with(Field::new("city")))
        .into();

    binding.load_form_from_model(&mut form, &mut model).unwrap();
    assert_eq!(value_at(&form, "home/city"), Some(Value::from("Gent")));
    assert_eq!(value_at(&form, "work/city"), Some(Value::from("Brussel")));

    set(&mut form, "work/city", "Leuven");
    binding.save_form_to_model(&form, &mut model).unwrap();
    assert_eq!(
        model.to_xml_string(),
        "<person><home><city>Gent</city></home><work><city>Leuven</city></work></person>"
    );
}

#[test]
fn test_recursive_class() {
    let binding = build(
        r#"<fb:class id="node">
             <fb:value id="name" path="@name"/>
             <fb:group id="child" path="node" direction="load">
               <fb:new id="node"/>
             </fb:group>
           </fb:class>
           <fb:context path="node"><fb:new id="node"/></fb:context>"#,
    );
    let mut model = XmlDocument::parse(
        "tree.xml",
        r#"<tree><node name="a"><node name="b"/></node></tree>"#,
    )
    .unwrap();
    let mut form: Widget = Group::new("form")
        .with(Field::new("name"))
        .with(
            Group::new("child")
                .with(Field::new("name"))
                .with(Group::new("child").with(Field::new("name"))),
        )
        .into();

    binding.load_form_from_model(&mut form, &mut model).unwrap();
    assert_eq!(value_at(&form, "name"), Some(Value::from("a")));
    assert_eq!(value_at(&form, "child/name"), Some(Value::from("b")));
    assert_eq!(value_at(&form, "child/child/name"), None);
}

#[test]
fn test_on_update_runs_only_after_a_write() {
    let binding = build(
        r#"<fb:value id="name" path="name">
             <fb:on-update><fb:value id="stamp" path="@changed"/></fb:on-update>
           </fb:value>"#,
    );
    let mut model = XmlDocument::parse("person.xml", "<person><name>Ann</name></person>").unwrap();
    let mut form: Widget = Group::new("form")
        .with(Field::new("name"))
        .with(Field::new("stamp"))
        .into();
    binding.load_form_from_model(&mut form, &mut model).unwrap();
    set(&mut form, "stamp", "yes");

    binding.save_form_to_model(&form, &mut model).unwrap();
    assert_eq!(model.to_xml_string(), "<person><name>Ann</name></person>");

    set(&mut form, "name", "Bea");
    binding.save_form_to_model(&form, &mut model).unwrap();
    assert_eq!(model.to_xml_string(), r#"<person><name changed="yes">Bea</name></person>"#);
}

#[test]
fn test_unique_field_refuses_identity_change() {
    let binding = build(r#"<fb:unique-field id="id" path="@id"/>"#);
    let mut model = XmlDocument::parse("person.xml", r#"<person id="1"/>"#).unwrap();
    let mut form: Widget = Group::new("form").with(Field::new("id")).into();

    binding.load_form_from_model(&mut form, &mut model).unwrap();
    binding.save_form_to_model(&form, &mut model).unwrap();

    set(&mut form, "id", "2");
    let err = binding.save_form_to_model(&form, &mut model).unwrap_err();
    assert!(matches!(err, BindingError::IdentityChange { .. }));
    assert_eq!(model.to_xml_string(), r#"<person id="1"/>"#);
}

/// Keeps a list widget as text joined with a configured separator
#[derive(Debug)]
struct Joined {
    separator: String,
}

impl CustomBinding for Joined {
    fn load(&self, widget: &mut Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let text = context.value(&Path::parse(".")?)?;
        let words = text.map(|v| Value::from(v.to_string().replace(self.separator.as_str(), " ")));
        widget.set_value(words)
    }

    fn save(&self, widget: &Widget, context: &mut PathContext<'_>) -> BindingResult<()> {
        let text = widget
            .value()
            .map(|v| Value::from(v.to_string().replace(' ', self.separator.as_str())));
        context.create_path_and_set_value(&Path::parse(".")?, text.as_ref())?;
        Ok(())
    }
}

fn joined_factory() -> CustomBindingFactory {
    Arc::new(
        |config: Option<&ElementTemplate>| -> BindingResult<Arc<dyn CustomBinding>> {
            let separator = config.and_then(|c| c.attribute("separator")).unwrap_or(",");
            let plugin: Arc<dyn CustomBinding> = Arc::new(Joined {
                separator: separator.to_string(),
            });
            Ok(plugin)
        },
    )
}

#[test]
fn test_custom_binding_plugin() {
    let mut builder = DescriptorBuilder::new();
    builder.register_custom_binding("org.example.Joined", joined_factory());
    let binding = builder
        .build_from_str(
            "tags-binding.xml",
            &descriptor(
                r#"<fb:custom id="tags" path="tags" class="org.example.Joined">
                     <fb:config separator=";"/>
                   </fb:custom>"#,
            ),
        )
        .unwrap();
    let mut model = XmlDocument::parse("post.xml", "<post><tags>a;b</tags></post>").unwrap();
    let mut form: Widget = Group::new("form").with(Field::new("tags")).into();

    binding.load_form_from_model(&mut form, &mut model).unwrap();
    assert_eq!(value_at(&form, "tags"), Some(Value::from("a b")));

    set(&mut form, "tags", "x y z");
    binding.save_form_to_model(&form, &mut model).unwrap();
    assert_eq!(model.to_xml_string(), "<post><tags>x;y;z</tags></post>");
}

#[test]
fn test_scripts_through_the_manager() {
    let mut library = ScriptLibrary::new();
    let load: LoadScript = Arc::new(
        |widget: &mut Widget, context: Option<&mut PathContext>, children: &ChildBindings| -> BindingResult<()> {
            match context {
                Some(context) => children["names"].load(widget, context),
                None => Ok(()),
            }
        },
    );
    let save: SaveScript = Arc::new(
        |widget: &Widget, context: &mut PathContext, children: &ChildBindings| -> BindingResult<()> {
            children["names"].save(widget, context)?;
            let first = widget.lookup("first").and_then(Widget::value);
            let last = widget.lookup("last").and_then(Widget::value);
            let full = match (first, last) {
                (Some(first), Some(last)) => Some(Value::from(format!("{first} {last}"))),
                _ => None,
            };
            context.create_path_and_set_value(&Path::parse("@full")?, full.as_ref())?;
            Ok(())
        },
    );
    library.register_load("loadNames", load);
    library.register_save("saveNames", save);

    let builder = DescriptorBuilder::new().with_script_engine(Arc::new(library));
    let manager = BindingManager::with_builder(builder, BindingConfig::default());
    let source = DescriptorSource::inline(
        "names",
        descriptor(
            r#"<fb:javascript path="name">
                 <fb:load-form>loadNames</fb:load-form>
                 <fb:save-form>
                   saveNames
                 </fb:save-form>
                 <fb:child-binding name="names">
                   <fb:value id="first" path="first"/>
                   <fb:value id="last" path="last"/>
                 </fb:child-binding>
               </fb:javascript>"#,
        ),
    );
    let mut model = XmlDocument::parse(
        "person.xml",
        "<person><name><first>Ann</first><last>Lee</last></name></person>",
    )
    .unwrap();
    let mut form: Widget = Group::new("form")
        .with(Field::new("first"))
        .with(Field::new("last"))
        .into();

    manager.load_form(&source, &mut form, &mut model).unwrap();
    assert_eq!(value_at(&form, "last"), Some(Value::from("Lee")));

    set(&mut form, "first", "Bea");
    manager.save_form(&source, &form, &mut model).unwrap();
    assert_eq!(
        model.to_xml_string(),
        r#"<person><name full="Bea Lee"><first>Bea</first><last>Lee</last></name></person>"#
    );
    assert_eq!(manager.cache_stats().hits, 1);
}

#[test]
fn test_insert_node_fragment_from_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("row.xml"), r#"<row status="new"/>"#).unwrap();
    let descriptor_path = dir.path().join("binding.xml");
    std::fs::write(
        &descriptor_path,
        descriptor(
            r#"<fb:repeater id="rows" parent-path="." row-path="row">
                 <fb:identity><fb:value id="id" path="@id"/></fb:identity>
                 <fb:on-insert-row><fb:insert-node src="row.xml"/></fb:on-insert-row>
               </fb:repeater>"#,
        ),
    )
    .unwrap();

    let manager = BindingManager::with_defaults();
    let source = DescriptorSource::file(&descriptor_path);
    let mut model = XmlDocument::parse("rows.xml", "<rows/>").unwrap();
    let mut form: Widget = Group::new("form")
        .with(Repeater::new("rows", [Field::new("id").into()]))
        .into();
    form.lookup_mut("rows").and_then(Widget::as_repeater_mut).unwrap().add_row();
    set(&mut form, "rows/0/id", "1");

    manager.save_form(&source, &form, &mut model).unwrap();
    assert_eq!(model.to_xml_string(), r#"<rows><row status="new" id="1"/></rows>"#);
}

#[test]
fn test_insert_bean_into_json_collection() {
    let mut builder = DescriptorBuilder::new();
    let contact: BeanFactory = Arc::new(|| json!({"kind": "new"}));
    builder.register_bean_factory("Contact", contact);
    let binding = builder
        .build_from_str(
            "contacts-binding.xml",
            &descriptor(
                r#"<fb:repeater id="contacts" parent-path="contacts" row-path="contact">
                     <fb:identity><fb:value id="id" path="@id"/></fb:identity>
                     <fb:on-bind><fb:value id="email" path="email"/></fb:on-bind>
                     <fb:on-insert-row><fb:insert-bean classname="Contact" addmethod="contact"/></fb:on-insert-row>
                     <fb:on-delete-row><fb:delete-node/></fb:on-delete-row>
                   </fb:repeater>"#,
            ),
        )
        .unwrap();
    let mut model = JsonModel::new(json!({
        "contacts": {"contact": [
            {"id": 1, "email": "a@example.org"},
            {"id": 2, "email": "b@example.org"}
        ]}
    }));
    let mut form: Widget = Group::new("form")
        .with(Repeater::new("contacts", [Field::new("id").into(), Field::new("email").into()]))
        .into();

    binding.load_form_from_model(&mut form, &mut model).unwrap();
    assert_eq!(value_at(&form, "contacts/1/id"), Some(Value::Integer(2)));

    let rows = form.lookup_mut("contacts").and_then(Widget::as_repeater_mut).unwrap();
    rows.remove_row(0);
    let fresh = rows.add_row();
    fresh.lookup_mut("id").unwrap().set_value(Some(Value::Integer(3))).unwrap();
    fresh
        .lookup_mut("email")
        .unwrap()
        .set_value(Some("c@example.org".into()))
        .unwrap();

    binding.save_form_to_model(&form, &mut model).unwrap();
    assert_eq!(
        model.root(),
        &json!({
            "contacts": {"contact": [
                {"id": 2, "email": "b@example.org"},
                {"kind": "new", "id": 3, "email": "c@example.org"}
            ]}
        })
    );
}
