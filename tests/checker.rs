#[cfg(test)]
mod checker_tests {
    use surveyc as survey;

    use rstest::rstest;
    use survey::checker::check;
    use survey::error::SurveyError;
    use survey::parser::Parser;

    fn check_source(source: &str) -> Result<(), SurveyError> {
        let doc = Parser::from_source(source)
            .parse()
            .unwrap_or_else(|e| panic!("{:?} should parse: {}", source, e));

        check(&doc)
    }

    #[rstest]
    #[case::single_choice("<< q1 @single_choice >> Pick one [r1] A [r2] B")]
    #[case::open_text("<< q1 @text >> Anything else?")]
    #[case::number_with_expression_bound("<< q1 @number @can_skip >> Age ${hint}")]
    #[case::selections(
        r#"<< q1 @multiple_choice @minimal_selections="1" @maximum_selections=${limit} @rotate_rows >>
           Pick [r1 @fixed] A [r2 @xor] None [r3 @all] All"#
    )]
    #[case::matrix(
        r#"<< q1 @single_choice_matrix @randomize_columns @minimal_value=" 2 " >>
           Rate [r1] Food [c1 @col] Good [c2 @col @data="bad"] Bad"#
    )]
    #[case::section("<< @rotate_questions >> << q1 @text >> Age")]
    #[case::order_by_expression("<< q1 @single_choice @rotate_rows=${seed} >> Q [r1] A")]
    #[case::logic_only("<% def a = 1 %>")]
    fn test_valid_surveys(#[case] source: &str) {
        if let Err(e) = check_source(source) {
            panic!("{:?} should pass: {}", source, e);
        }
    }

    #[rstest]
    // names
    #[case("<< @single_choice >> Q [r1] A", "Question has no name")]
    #[case("<< q1 q2 @single_choice >> Q", "more than one name found: q1, q2")]
    #[case("<< q1 @single_choice >> Q [@fixed] A", "Row has no name")]
    #[case("<< q1 @single_choice_matrix >> Q [r1] A [@col] B", "Column has no name")]
    #[case("<< q1 @single_choice >> Q [r1 r2] A", "more than one name found: r1, r2")]
    // known and duplicate attributes
    #[case("<< q1 @bogus @text >> Q", "bogus is not a recognised attribute")]
    #[case("<< q1 @text @col >> Q", "col is not a recognised attribute")]
    #[case("<< @foo >> << q1 @text >> Q", "foo is not a recognised attribute")]
    #[case("<< q1 @text @hide @hide >> Q", "Duplicate attributes: hide")]
    #[case("<< @hide @hide >> << q1 @text >> Q", "Duplicate attributes: hide")]
    #[case("<< q1 @single_choice >> Q [r1 @fixed @fixed] A", "Duplicate attributes: fixed")]
    // exclusive groups
    #[case(
        "<< q1 @single_choice @multiple_choice >> Q",
        "Duplicate kinds of attributes: single_choice, multiple_choice"
    )]
    #[case(
        "<< q1 @multiple_choice @rotate_rows @randomize_rows >> Q",
        "Duplicate kinds of attributes: rotate_rows, randomize_rows"
    )]
    #[case(
        "<< q1 @single_choice_matrix @randomize_columns @rotate_columns >> Q",
        "Duplicate kinds of attributes: randomize_columns, rotate_columns"
    )]
    #[case(
        "<< q1 @multiple_choice >> Q [r1 @all @xor] A",
        "Duplicate kinds of attributes: all, xor"
    )]
    // question type
    #[case("<< q1 @hide >> Q", "You need to specify question type")]
    #[case("<< q1 @text >> Q [r1] A", "text questions cannot have rows")]
    #[case("<< q1 @number >> Q [r1] A", "number questions cannot have rows")]
    #[case("<< q1 @text @randomize_rows >> Q", "randomize_rows does not apply to text questions")]
    #[case("<< q1 @single_choice >> Q [c1 @col] A", "single_choice questions cannot have columns")]
    #[case(
        "<< q1 @multiple_choice @rotate_columns >> Q [r1] A",
        "rotate_columns does not apply to multiple_choice questions"
    )]
    #[case(
        r#"<< q1 @text @minimal_selections="1" >> Q"#,
        "minimal_selections does not apply to text questions"
    )]
    #[case(
        r#"<< q1 @number @maximum_value="10" >> Q"#,
        "maximum_value does not apply to number questions"
    )]
    #[case(
        "<< q1 @single_choice_matrix >> Q [r1 @xor] A [c1 @col] B",
        "xor attribute does not apply to rows in matrix questions"
    )]
    #[case(
        "<< q1 @multi_choice_matrix >> Q [r1 @all] A [c1 @col] B",
        "'all' attribute does not apply to rows in matrix questions"
    )]
    // options
    #[case("<< q1 @single_choice >> Q [r1 @foo] A", "foo does not apply to option")]
    #[case("<< q1 @single_choice >> Q [r1 @hide] A", "hide does not apply to option")]
    // attribute values
    #[case(
        r#"<< q1 @single_choice @rotate_rows="yes" >> Q [r1] A"#,
        "rotate_rows either does not have value or has a simple expression as value"
    )]
    #[case(
        r#"<< q1 @multiple_choice @minimal_selections="two" >> Q [r1] A"#,
        "cannot parse the value of minimal_selections to an integer"
    )]
    #[case(
        r#"<< q1 @multiple_choice @maximum_selections="1.5" >> Q [r1] A"#,
        "cannot parse the value of maximum_selections to an integer"
    )]
    #[case(
        "<< q1 @multiple_choice @maximum_selections >> Q [r1] A",
        "maximum_selections needs to have a string or a simple expression as value"
    )]
    #[case("<< q1 @single_choice >> Q [r1 @data] A", "data needs to have a string as value")]
    #[case(
        "<< q1 @single_choice >> Q [r1 @data=${x}] A",
        "data needs to have a string as value"
    )]
    fn test_semantic_errors(#[case] source: &str, #[case] message: &str) {
        let err = check_source(source).expect_err("survey should be rejected");

        assert!(err.is_semantic(), "{} is not a semantic error", err);
        assert_eq!(err.message(), message);
    }

    #[test]
    fn test_missing_name_points_at_the_question() {
        let err = check_source("<% def a %>\n  << @text >> Q").unwrap_err();

        assert_eq!((err.line(), err.column()), (2, 3));
    }

    #[test]
    fn test_exclusive_group_points_at_second_member() {
        let err = check_source("<< q1 @single_choice @multiple_choice >> Q").unwrap_err();

        assert_eq!((err.line(), err.column()), (1, 22));
    }

    #[test]
    fn test_rows_error_points_at_first_row() {
        let err = check_source("<< q1 @text >> Q\n[r1] A").unwrap_err();

        assert_eq!((err.line(), err.column()), (2, 1));
    }

    #[test]
    fn test_bad_integer_points_at_the_value() {
        let err = check_source(r#"<< q1 @multiple_choice @minimal_selections="x" >> Q [r1] A"#)
            .unwrap_err();

        assert_eq!((err.line(), err.column()), (1, 44));
    }

    #[test]
    fn test_structure_is_checked_before_values() {
        let err = check_source(
            r#"<< q1 @multiple_choice @minimal_selections="x" >> Q [r1] A
               << @text >> Unnamed"#,
        )
        .unwrap_err();

        assert_eq!(err.message(), "Question has no name");
    }

    #[test]
    fn test_check_does_not_reorder_attributes() {
        let source = "<< q1 @text @hide >> Q";
        let doc = Parser::from_source(source).parse().unwrap();
        let before = doc.clone();

        check(&doc).unwrap();

        assert_eq!(doc, before);
    }
}
