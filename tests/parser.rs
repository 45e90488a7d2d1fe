#[cfg(test)]
mod parser_tests {
    use surveyc as survey;

    use rstest::rstest;
    use survey::ast::*;
    use survey::error::SurveyError;
    use survey::lexer::Lexer;
    use survey::parser::{Parser, ParserConfig};
    use survey::walker::{walk, NodeRef, Visitor};

    fn parse(source: &str) -> Document<'_> {
        Parser::from_source(source)
            .parse()
            .unwrap_or_else(|e| panic!("{:?} should parse: {}", source, e))
    }

    fn parse_error(source: &str) -> SurveyError {
        Parser::from_source(source)
            .parse()
            .expect_err("source should not parse")
    }

    fn statements<'d, 'a>(doc: &'d Document<'a>) -> &'d [Statement<'a>] {
        match &doc.components[0] {
            SurveyComponent::Interlude(interlude) => &interlude.statements,
            other => panic!("expected an interlude, got {:?}", other),
        }
    }

    /// Prefix form of every statement of the first logic block.
    fn printed(source: &str) -> Vec<String> {
        let doc = parse(source);
        statements(&doc).iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case("1 + 2 * 3", "(+ 1 (* 2 3))")]
    #[case("1 * 2 + 3", "(+ (* 1 2) 3)")]
    #[case("a and b == c", "(and a (== b c))")]
    #[case("1 - 2 - 3", "(- (- 1 2) 3)")]
    #[case("a < b + 1 and c != d % 2", "(and (< a (+ b 1)) (!= c (% d 2)))")]
    #[case("(1 + 2) * 3", "(* (+ 1 2) 3)")]
    #[case("q1.r1.hidden", "(. (. q1 r1) hidden)")]
    #[case("(q1).r1", "(. q1 r1)")]
    #[case("x = y * 2", "(= x (* y 2))")]
    #[case("\"hi\" == 'hi'", "(== \"hi\" \"hi\")")]
    #[case("true and undefined", "(and true undefined)")]
    #[case("answer for q1 has (r1, r2)", "(has q1 r1 r2)")]
    #[case("answer for q1 only_has () and ok", "(and (only_has q1) ok)")]
    #[case("100000000000000000000 + 3.0", "(+ 100000000000000000000 3)")]
    fn test_expression_shapes(#[case] expression: &str, #[case] expected: &str) {
        let source = format!("<% {} %>", expression);

        assert_eq!(printed(&source), [expected]);
    }

    #[test]
    fn test_precedence_tree_shape() {
        let doc = parse("<% 1 + 2 * 3 %>");

        let Statement::Simple(simple) = &statements(&doc)[0] else {
            panic!("expected an expression statement");
        };
        let ExprKind::Binary { left, op, right } = &simple.expression.kind else {
            panic!("expected a binary expression");
        };

        assert_eq!(*op, BinaryOp::Add);
        assert_eq!(left.kind, ExprKind::Number(1.0));
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn test_property_access_is_not_an_assignment_target() {
        let err = parse_error("<% def a = 1; a.x = 2 %>");

        assert!(err.is_syntax());
        assert_eq!(err.message(), "Invalid assignment");
    }

    #[test]
    fn test_assignment_to_declared_name() {
        assert_eq!(printed("<% def a\n a = 2 %>"), ["(def a)", "(= a 2)"]);
        assert_eq!(printed("<% def a = 1; a = a + 1; %>"), ["(def a 1)", "(= a (+ a 1))"]);
    }

    #[test]
    fn test_logic_statements() {
        let source = r#"<%
            rule r1 : | q1.r1 == 1 | ok { hide(q2, q3) terminate() }
            action skip { go_to(q4) }
            conditions both : | a | b end
            evaluate r1
            do skip
            show_error("too many")
        %>"#;

        assert_eq!(
            printed(source),
            [
                "(rule r1 | (== (. q1 r1) 1) | ok {(hide q2 q3) (terminate)})",
                "(action skip {(go_to q4)})",
                "(conditions both | a | b)",
                "(evaluate r1)",
                "(do skip)",
                "(show_error \"too many\")",
            ]
        );
    }

    #[test]
    fn test_questions_sections_and_interludes() {
        let doc = parse(
            "<< @rotate_questions >>\n\
             << q1 @single_choice_matrix >> Rate ${name} [r1] Food [c1 @col] Good [r2] Drinks\n\
             <% hide(q1) %>\n\
             << q2 @text >> Anything else?",
        );

        assert_eq!(doc.components.len(), 4);
        assert!(matches!(doc.components[0], SurveyComponent::Section(_)));
        assert!(matches!(doc.components[2], SurveyComponent::Interlude(_)));

        let SurveyComponent::Question(q1) = &doc.components[1] else {
            panic!("expected a question");
        };

        assert_eq!(q1.name(), Some("q1"));
        assert_eq!(q1.texts.len(), 2);
        assert!(matches!(&q1.texts[0], TextPart::Text(t) if t.text == "Rate"));
        assert!(matches!(q1.texts[1], TextPart::Embedded(_)));

        let rows: Vec<_> = q1.rows.iter().filter_map(|r| r.name()).collect();
        let columns: Vec<_> = q1.columns.iter().filter_map(|c| c.name()).collect();
        assert_eq!(rows, ["r1", "r2"]);
        assert_eq!(columns, ["c1"]);
    }

    #[test]
    fn test_unicode_whitespace_between_blocks_makes_a_section() {
        let doc = parse("<< q1 @text >> \u{00A0} << q2 @text >> Age");

        assert!(matches!(doc.components[0], SurveyComponent::Section(_)));
        assert!(matches!(doc.components[1], SurveyComponent::Question(_)));
    }

    #[test]
    fn test_attribute_values() {
        let doc = parse(r#"<< q1 @single_choice @data="x" @minimal_selections=${n + 1} >> Q"#);

        let SurveyComponent::Question(q) = &doc.components[0] else {
            panic!("expected a question");
        };

        assert!(q.attribute("q1").map_or(false, |a| a.is_custom));
        assert!(q.attribute("single_choice").map_or(false, |a| a.value.is_none()));
        assert!(matches!(
            q.attribute("data").and_then(|a| a.value.as_ref()),
            Some(AttributeValue::Str(t)) if t.text == "x"
        ));
        assert!(matches!(
            q.attribute("minimal_selections").and_then(|a| a.value.as_ref()),
            Some(AttributeValue::Embedded(s)) if s.expression.to_string() == "(+ n 1)"
        ));
    }

    #[test]
    fn test_trailing_attribute_block_is_a_question() {
        let doc = parse("<< q1 @text >> Age? << q2 @number >>");

        assert_eq!(doc.components.len(), 2);
        assert!(
            matches!(&doc.components[1], SurveyComponent::Question(q) if q.texts.is_empty())
        );
    }

    #[rstest]
    #[case("<% rule r : | a %>", "expecting | but found %>")]
    #[case("<% hide(a, b %>", "expecting ) but found %>")]
    #[case("<% evaluate 3 %>", "expecting identifier / name but found 3")]
    #[case("<% def 3 %>", "expecting identifier / name but found 3")]
    #[case("<% action a hide() %>", "expecting { but found hide")]
    #[case("<% conditions c : | a %>", "expecting | but found %>")]
    #[case("<% { %>", "unexpected token: {")]
    #[case("<% has(a) %>", "unexpected token: has")]
    #[case("<% answer for q1 hide (a) %>", "unexpected token: hide")]
    #[case("<% q1.hide %>", "invalid property name")]
    #[case("<% (a + 1 %>", "expecting ) but found %>")]
    #[case("<% 1 + %>", "unexpected token: %>")]
    #[case("<% x = 1", "expecting %> but found end of input")]
    #[case("<< q1 @single_choice", "expecting >> but found end of input")]
    #[case("<< q1 = >>", "Invalid attribute name =")]
    #[case(
        "<< q1 @data=x >>",
        "value of an attribute must be either a string or an embedded expression, but found x"
    )]
    #[case("<< q1 @text >> Q ${ 1 ", "expecting } but found end of input")]
    #[case("[r1] Orphan", "unexpected token: [")]
    #[case("<< q1 @text >> Q %> <%", "expecting %> but found end of input")]
    fn test_syntax_errors(#[case] source: &str, #[case] message: &str) {
        let err = parse_error(source);

        assert!(err.is_syntax());
        assert_eq!(err.message(), message);
    }

    #[test]
    fn test_errors_carry_the_offending_position() {
        let err = parse_error("<%\n  def a = 1\n  a.b = 2\n%>");

        assert_eq!(err.message(), "Invalid assignment");
        assert_eq!((err.line(), err.column()), (3, 7));
    }

    #[test]
    fn test_lexer_errors_surface_through_the_parser() {
        let err = parse_error("<< q1 @text >> Q <% # %>");

        assert_eq!(err.message(), "Unexpected character '#'");
        assert_eq!((err.line(), err.column()), (1, 21));
    }

    #[test]
    fn test_pathological_nesting_is_rejected() {
        let source = format!("<% {}1{} %>", "(".repeat(500), ")".repeat(500));
        let err = parse_error(&source);

        assert_eq!(err.message(), "nesting too deep");

        let blocks = format!("<% {}{} %>", "action a { ".repeat(20), "} ".repeat(20));
        let config = ParserConfig {
            max_nesting: 10,
            ..ParserConfig::default()
        };
        let err = Parser::with_config(Lexer::new(&blocks), config)
            .parse()
            .unwrap_err();

        assert_eq!(err.message(), "nesting too deep");
    }

    #[test]
    fn test_long_flat_chains_are_rejected() {
        let operators = format!("<% x = {} %>", vec!["1"; 20_000].join(" + "));
        let err = survey::compile(&operators).unwrap_err();

        assert!(err.is_syntax());
        assert_eq!(err.message(), "nesting too deep");

        let properties = format!("<% {} %>", vec!["a"; 20_000].join("."));
        let err = survey::compile(&properties).unwrap_err();

        assert_eq!(err.message(), "nesting too deep");

        let embedded = format!("<< q1 @text >> Q ${{{}}}", vec!["n"; 20_000].join(" * "));
        assert_eq!(survey::compile(&embedded).unwrap_err().message(), "nesting too deep");
    }

    #[test]
    fn test_chains_within_the_default_depth_are_walked() {
        let source = format!(
            "<< q1 @text >> Q <% def total = {} hide(q1.{}) %>",
            vec!["1"; 200].join(" + "),
            vec!["a"; 200].join(".")
        );

        assert!(survey::compile(&source).is_ok());
    }

    #[test]
    fn test_answer_checks_nest_under_the_limit() {
        let source = "<% answer for q1 has (answer for q2 has (r1)) %>";

        assert_eq!(printed(source), ["(has q1 (has q2 r1))"]);
    }

    struct SpanCheck {
        open: usize,
        nodes: usize,
    }

    impl<'n, 'a> Visitor<'n, 'a> for SpanCheck {
        fn enter(&mut self, node: NodeRef<'n, 'a>) -> survey::error::Result<()> {
            let (start, end) = node.bounds();

            assert!(
                start.position <= end.position,
                "{:?} ends before it starts",
                node
            );

            self.open += 1;
            self.nodes += 1;
            Ok(())
        }

        fn leave(&mut self, _node: NodeRef<'n, 'a>) -> survey::error::Result<()> {
            self.open -= 1;
            Ok(())
        }
    }

    #[test]
    fn test_every_span_starts_before_it_ends() {
        let doc = parse(
            r#"<< q1 @multiple_choice @maximum_selections=${limit * 2} >> Pick ${who}
               [r1 @fixed] A [r2 @xor] None
               <% def limit = 3
                  rule cap : | answer for q1 has (r1) | (limit > 1) { hide(q1.r2) }
                  action a { x = (1 + 2) * 3 }
               %>"#,
        );
        let mut check = SpanCheck { open: 0, nodes: 0 };

        walk(&doc, &mut check).unwrap();

        assert_eq!(check.open, 0);
        assert!(check.nodes > 30);
    }

    #[test]
    fn test_syntax_tree_serialises_to_json() {
        let doc = parse("<< q1 @text >> Age <% x = 1 %>");
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["components"][0]["Question"]["texts"][0]["Text"]["text"], "Age");
        assert_eq!(
            json["components"][1]["Interlude"]["statements"][0]["Simple"]["expression"]["kind"]
                ["Assign"]["target"]["token"]["text"],
            "x"
        );
    }
}
