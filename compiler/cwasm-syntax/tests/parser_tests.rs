use cwasm_syntax::{AstItem, Lexer, Parser};

#[test]
fn test_parse_corpus() {
    insta::glob!("data/*.c", |path| {
        let input = std::fs::read_to_string(path).unwrap();
        let mut lexer = Lexer::new(&input);
        let mut parser = Parser::new(&mut lexer);
        let translation_unit = parser
            .parse()
            .expect("failed to parse corpus file into ast");
        assert!(!translation_unit.items.is_empty());
        // The tree must stay serializable for `--emit-ast`.
        let ron = ron::to_string(&translation_unit).expect("failed to serialize ast");
        assert!(ron.contains("items"));
    })
}

#[test]
fn test_parse_function_returning_function_pointer() {
    let input = std::fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/varargs.c"))
        .unwrap();
    let unit = cwasm_syntax::parse(&input).unwrap();
    let names = unit
        .items
        .iter()
        .filter_map(|item| match item {
            AstItem::Function(f) => f.declarator.name.as_ref().map(|n| n.name.clone()),
            AstItem::Declaration(_) => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["sum_all", "scale", "pick"]);
}
