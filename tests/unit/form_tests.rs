use super::*;
use crate::schema::{APARTMENT_SCHEMA_KEY, HOTEL_SCHEMA_KEY, builtin_schema};

fn encode(controls: &[RawControl]) -> EncodedSubmission {
    encode_submission(controls).expect("encoding should succeed")
}

#[test]
fn encodes_number_and_checkbox_in_submission_order() {
    let encoded = encode(&[
        RawControl::new("fv-NumRooms", RawValue::Number("3".to_string())),
        RawControl::new("fv-HasBalcony", RawValue::Checkbox(true)),
    ]);
    assert_eq!(encoded.text, r#"? {"NumRooms": 3, "HasBalcony": True}"#);
    assert!(encoded.skipped.is_empty());
}

#[test]
fn unchecked_checkbox_encodes_bare_false() {
    let encoded = encode(&[RawControl::new("fv-HasElevator", RawValue::Checkbox(false))]);
    assert_eq!(encoded.text, r#"? {"HasElevator": False}"#);
    assert!(!encoded.text.contains("false"));
    assert_eq!(encoded.parameters["HasElevator"], Value::Bool(false));
}

#[test]
fn numeric_looking_values_become_json_numbers() {
    let encoded = encode(&[
        RawControl::new("fv-Level", RawValue::Number("12".to_string())),
        RawControl::new("fv-FloorSquareMeters", RawValue::Number("72.5".to_string())),
        RawControl::new("fv-AverageRating", RawValue::SelectOne(" 4 stars".to_string())),
    ]);
    assert_eq!(
        encoded.text,
        r#"? {"Level": 12, "FloorSquareMeters": 72.5, "AverageRating": 4}"#
    );
    assert!(encoded.parameters["Level"].is_number());
}

#[test]
fn non_numeric_selections_are_kept_verbatim() {
    let encoded = encode(&[
        RawControl::new("fv-BalconySide", RawValue::SelectOne("south".to_string())),
        RawControl::new("fv-Level", RawValue::Number(String::new())),
    ]);
    assert_eq!(encoded.text, r#"? {"BalconySide": "south", "Level": ""}"#);
}

#[test]
fn text_values_are_never_coerced() {
    let encoded = encode(&[RawControl::new(
        "fv-Notes",
        RawValue::Text("2 cats, \"quiet\"".to_string()),
    )]);
    assert_eq!(encoded.text, r#"? {"Notes": "2 cats, \"quiet\""}"#);
}

#[test]
fn controls_without_prefix_are_ignored() {
    let encoded = encode(&[
        RawControl::new("search", RawValue::Text("ignored".to_string())),
        RawControl::new("NumRooms", RawValue::Number("2".to_string())),
    ]);
    assert_eq!(encoded.text, "? {}");
    assert!(encoded.parameters.is_empty());
}

#[test]
fn operator_select_is_overwritten_by_number_sharing_its_name() {
    let encoded = encode(&[
        RawControl::new("fv-NumRooms", RawValue::SelectOne("is_greater_than".to_string())),
        RawControl::new("fv-HasBalcony", RawValue::Checkbox(true)),
        RawControl::new("fv-NumRooms", RawValue::Number("2".to_string())),
    ]);
    assert_eq!(encoded.text, r#"? {"NumRooms": 2, "HasBalcony": True}"#);
}

#[test]
fn multi_select_is_skipped_with_explicit_error() {
    let encoded = encode(&[
        RawControl::new(
            "fv-NearbyPOIs",
            RawValue::SelectMultiple(vec!["Park".to_string()]),
        ),
        RawControl::new("fv-NumRooms", RawValue::Number("1".to_string())),
    ]);
    assert_eq!(encoded.text, r#"? {"NumRooms": 1}"#);
    assert_eq!(
        encoded.skipped,
        vec![FormError::UnsupportedFieldType {
            field: "NearbyPOIs".to_string(),
            field_type: FieldType::CategoricalMultiple,
        }]
    );
}

#[test]
fn leading_number_follows_decimal_prefix_rules() {
    assert_eq!(leading_number("3"), Some(3.0));
    assert_eq!(leading_number("  -2.5e1x"), Some(-25.0));
    assert_eq!(leading_number(".5"), Some(0.5));
    assert_eq!(leading_number("7e"), Some(7.0));
    assert_eq!(leading_number("is"), None);
    assert_eq!(leading_number("-"), None);
    assert_eq!(leading_number("."), None);
    assert_eq!(leading_number(""), None);
}

#[test]
fn renders_one_control_kind_per_field_type() {
    let apartment = builtin_schema(APARTMENT_SCHEMA_KEY);
    let level = render_field_control(apartment.input_field("Level").expect("Level"), false);
    assert_eq!(level.input_name, "fv-Level");
    assert_eq!(
        level.kind,
        ControlKind::OperatorNumber {
            operators: IntegerOperator::ALL,
            min: Some(0),
            max: Some(15),
        }
    );

    let balcony = render_field_control(apartment.input_field("HasBalcony").expect("HasBalcony"), false);
    assert_eq!(balcony.kind, ControlKind::Toggle);

    let side = render_field_control(apartment.input_field("BalconySide").expect("BalconySide"), true);
    assert!(side.required);
    assert!(matches!(side.kind, ControlKind::SingleChoice { ref options } if options.len() == 4));

    let pois = render_field_control(apartment.input_field("NearbyPOIs").expect("NearbyPOIs"), false);
    assert!(matches!(pois.kind, ControlKind::MultiChoice { ref options } if options[0] == "School"));

    let short = render_field_control(&FieldSpec::short_string("Origin"), false);
    assert_eq!(short.kind, ControlKind::SingleLineText);
    let long = render_field_control(&FieldSpec::long_string("Notes"), false);
    assert_eq!(long.kind, ControlKind::MultiLineText);
}

#[test]
fn render_form_marks_required_fields_and_unknown_names() {
    let apartment = builtin_schema(APARTMENT_SCHEMA_KEY);
    let controls = render_form(
        apartment,
        &["NumRooms".to_string(), "Pool".to_string(), "Level".to_string()],
    );
    assert_eq!(controls.len(), 3);
    assert!(controls[0].as_ref().expect("NumRooms control").required);
    assert_eq!(
        controls[1],
        Err(FormError::UnknownField {
            field: "Pool".to_string(),
            entity: "apartment".to_string(),
        })
    );
    assert!(!controls[2].as_ref().expect("Level control").required);
}

#[test]
fn hotel_controls_carry_enablement_condition() {
    let hotel = builtin_schema(HOTEL_SCHEMA_KEY);
    let controls = render_form(hotel, &["ServiceStopHour".to_string()]);
    let control = controls[0].as_ref().expect("control");
    assert_eq!(control.enabled_when.as_ref().map(|c| c.depends_on()), Some("Service"));
}

#[test]
fn add_then_remove_restores_prior_sequence() {
    let mut active = ActiveFieldSet::default();
    active.add_field(Category::Apartments, "NumRooms");
    active.add_field(Category::Apartments, "HasBalcony");
    let before = active.fields(Category::Apartments).to_vec();

    assert_eq!(active.add_field(Category::Apartments, "Level"), 2);
    assert_eq!(active.remove_field(Category::Apartments, "Level"), Some(2));
    assert_eq!(active.fields(Category::Apartments), before.as_slice());
}

#[test]
fn add_field_keeps_duplicates_and_remove_takes_first() {
    let mut active = ActiveFieldSet::default();
    active.add_field(Category::Hotels, "Cost");
    active.add_field(Category::Hotels, "Service");
    active.add_field(Category::Hotels, "Cost");

    assert_eq!(active.remove_field(Category::Hotels, "Cost"), Some(0));
    assert_eq!(active.fields(Category::Hotels), ["Service", "Cost"]);
    assert_eq!(active.remove_field(Category::Hotels, "Level"), None);
    assert!(active.fields(Category::Apartments).is_empty());
}

#[test]
fn control_removal_affordance_updates_active_set() {
    let apartment = builtin_schema(APARTMENT_SCHEMA_KEY);
    let mut active = ActiveFieldSet::default();
    active.add_field(Category::Trains, "Level");
    let control = render_field_control(apartment.input_field("Level").expect("Level"), false);
    assert_eq!(control.remove_from(&mut active, Category::Trains), Some(0));
    assert!(active.fields(Category::Trains).is_empty());
}

#[test]
fn integer_operators_cycle_both_ways() {
    assert_eq!(IntegerOperator::Is.cycled(true), IntegerOperator::IsGreaterThan);
    assert_eq!(IntegerOperator::Is.cycled(false), IntegerOperator::IsNot);
    assert_eq!(IntegerOperator::IsGreaterThan.value(), "is_greater_than");
    assert_eq!(IntegerOperator::IsGreaterThan.label(), "is greater than");
}
