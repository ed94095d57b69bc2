use grader::form::{ExerciseSchema, GradingResult, Selection, Submission, grade};
use serde_json::{Value, json};

fn grade_all(schema: Value, submission: Submission) -> GradingResult {
    let schema = ExerciseSchema::from_value(&schema).expect("valid schema");
    grade(&schema, &Selection::all(&schema), &submission).expect("grade")
}

fn single(field: Value) -> Value {
    json!({ "fieldgroups": [{ "fields": [field] }] })
}

fn checkbox() -> Value {
    single(json!({
        "type": "checkbox", "title": "Pick", "points": 10,
        "options": [
            { "label": "A", "correct": true, "hint": "A is right." },
            { "label": "B", "hint": "B is wrong." }
        ]
    }))
}

#[test]
fn checkbox_with_exactly_the_correct_options_scores() {
    let result = grade_all(checkbox(), Submission::new().with_many("field_0", ["option_0"]));
    assert_eq!(result.points, 10);
    assert_eq!(result.max_points, 10);
    assert!(result.is_correct());
    assert_eq!(result.fields[0].hints, "");
}

#[test]
fn checkbox_with_an_extra_option_fails_with_its_hint() {
    let result = grade_all(
        checkbox(),
        Submission::new().with_many("field_0", ["option_0", "option_1"]),
    );
    assert_eq!(result.points, 0);
    assert_eq!(result.max_points, 10);
    assert_eq!(result.fields[0].hints, "B is wrong.");
    assert_eq!(result.error_fields, ["field_0"]);
    assert_eq!(result.error_groups, ["group_0"]);
}

#[test]
fn checkbox_missing_a_correct_option_collects_its_hint() {
    let result = grade_all(checkbox(), Submission::new());
    assert_eq!(result.points, 0);
    assert_eq!(result.fields[0].hints, "A is right.");
}

#[test]
fn choices_without_correct_options_accept_anything() {
    let options = json!([{ "label": "A" }, { "label": "B" }]);
    for kind in ["checkbox", "radio", "dropdown", "select"] {
        let schema = single(json!({ "type": kind, "title": "Any", "points": 3, "options": options }));
        let picked = grade_all(schema.clone(), Submission::new().with_many("field_0", ["option_1"]));
        assert_eq!(picked.points, 3, "{kind}");
        let blank = grade_all(schema, Submission::new());
        assert_eq!(blank.points, 3, "{kind}");
    }
}

#[test]
fn radio_wrong_pick_collects_its_hint_and_the_missed_correct_one() {
    let schema = single(json!({
        "type": "radio", "title": "One", "points": 4,
        "options": [
            { "label": "A", "hint": "Not A." },
            { "label": "B", "correct": true, "hint": "Think about B." },
            { "label": "C", "hint": "Not C." }
        ]
    }));
    let wrong = grade_all(schema.clone(), Submission::new().with("field_0", "option_0"));
    assert_eq!(wrong.points, 0);
    assert_eq!(wrong.fields[0].hints, "Not A. Think about B.");

    let right = grade_all(schema, Submission::new().with("field_0", "option_1"));
    assert_eq!(right.points, 4);
    assert_eq!(right.fields[0].hints, "");
}

#[test]
fn correct_fields_carry_no_hints() {
    let schema = single(json!({
        "type": "checkbox", "title": "Any", "points": 2,
        "options": [{ "label": "A", "hint": "A is optional." }, { "label": "B" }]
    }));
    let result = grade_all(schema, Submission::new().with_many("field_0", ["option_0"]));
    assert_eq!(result.points, 2);
    assert_eq!(result.fields[0].hints, "");
}

#[test]
fn text_regex_matches_from_the_start_of_trimmed_input() {
    let schema = single(json!({
        "type": "text", "title": "Number", "points": 1,
        "regex": "^\\d+$", "hint": "Digits only."
    }));
    let ok = grade_all(schema.clone(), Submission::new().with("field_0", " 42 "));
    assert_eq!(ok.points, 1);

    let bad = grade_all(schema, Submission::new().with("field_0", "42a"));
    assert_eq!(bad.points, 0);
    assert_eq!(bad.fields[0].hints, "Digits only.");
}

#[test]
fn text_exact_answer_and_vacuous_text() {
    let exact = single(json!({ "type": "textarea", "title": "Say", "points": 2, "correct": "hello" }));
    assert_eq!(grade_all(exact.clone(), Submission::new().with("field_0", "hello\n")).points, 2);
    assert_eq!(grade_all(exact, Submission::new().with("field_0", "Hello")).points, 0);

    let free = single(json!({ "type": "text", "title": "Anything", "points": 2 }));
    assert_eq!(grade_all(free, Submission::new()).points, 2);
}

#[test]
fn exact_answer_takes_precedence_over_the_pattern() {
    let schema = single(json!({
        "type": "text", "title": "Answer", "points": 5,
        "correct": "42", "regex": "\\d+"
    }));
    let right = grade_all(schema.clone(), Submission::new().with("field_0", "42"));
    assert_eq!(right.points, 5);

    let wrong = grade_all(schema, Submission::new().with("field_0", "43"));
    assert_eq!(wrong.points, 0);
    assert!(!wrong.is_correct());
}

#[test]
fn invalid_regex_is_a_configuration_error() {
    let schema = ExerciseSchema::from_value(&single(json!({
        "type": "text", "title": "Broken", "regex": "(unclosed"
    })))
    .expect("schema");
    let err = grade(&schema, &Selection::all(&schema), &Submission::new()).unwrap_err();
    assert!(matches!(err, grader::GraderError::Configuration(_)));
}

fn table() -> Value {
    single(json!({
        "type": "table-radio", "title": "Classify", "points": 2,
        "options": [{ "label": "even" }, { "label": "odd" }],
        "rows": [
            { "label": "2", "correct_options": [true, false], "points": 1, "hint": "2 is even." },
            { "label": "3", "correct_options": [false, true], "points": 1, "hint": "3 is odd." },
            { "label": "4", "correct_options": [true], "points": 1, "hint": "4 is even." }
        ]
    }))
}

#[test]
fn table_rows_accumulate_points_and_hints_on_the_first_row() {
    let submission = Submission::new()
        .with("field_0", "option_0")
        .with("field_1", "option_0")
        .with("field_2", "option_1");
    let result = grade_all(table(), submission);

    assert_eq!(result.points, 1);
    assert_eq!(result.max_points, 5);
    assert_eq!(result.fields.len(), 3);
    assert_eq!(result.fields[0].hints, "3 is odd. 4 is even.");
    assert_eq!(result.fields[1].hints, "");
    assert_eq!(result.error_fields, ["field_0"]);
}

#[test]
fn fully_correct_table_earns_its_own_points_too() {
    let submission = Submission::new()
        .with("field_0", "option_0")
        .with("field_1", "option_1")
        .with("field_2", "option_0");
    let result = grade_all(table(), submission);
    assert_eq!(result.points, 5);
    assert!(result.is_correct());
}

#[test]
fn group_errors_hide_individual_fields() {
    let schema = json!({
        "fieldgroups": [
            { "group_errors": true, "fields": [
                { "type": "text", "title": "a", "correct": "a" },
                { "type": "text", "title": "b", "correct": "b" }
            ] },
            { "fields": [
                { "type": "text", "title": "c", "correct": "c" }
            ] }
        ]
    });
    let result = grade_all(schema, Submission::new().with("field_1", "b"));
    assert_eq!(result.error_groups, ["group_0", "group_1"]);
    assert_eq!(result.error_fields, ["field_2"]);
}

#[test]
fn grading_follows_the_builder_names_for_a_subset() {
    let schema = ExerciseSchema::from_value(&json!({
        "fieldgroups": [{ "pick_randomly": 1, "fields": [
            { "type": "text", "title": "a", "correct": "a", "points": 1 },
            { "type": "text", "title": "b", "correct": "b", "points": 1 }
        ] }]
    }))
    .expect("schema");
    let selection = grader::form::SampleManifest::apply(&schema, "1").expect("apply");
    let result = grade(&schema, &selection, &Submission::new().with("field_0", "b")).expect("grade");
    assert_eq!(result.points, 1);
    assert_eq!(result.max_points, 1);
}
