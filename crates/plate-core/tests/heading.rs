use manos_plate_core::{
    Attrs, Document, Editor, ElementNode, Node, PluginRegistry, Point, RangeSelection, TextNode,
    UpdateError,
};

fn editor_with_paragraphs(texts: &[&str], selection: RangeSelection) -> Editor {
    let doc = Document {
        children: texts.iter().map(|text| Node::paragraph(*text)).collect(),
    };
    Editor::new(doc, selection, PluginRegistry::richtext())
}

fn block_kinds(editor: &Editor) -> Vec<(String, Option<u64>)> {
    editor
        .doc()
        .children
        .iter()
        .map(|node| {
            let Node::Element(el) = node else {
                panic!("expected element block");
            };
            (
                el.kind.clone(),
                el.attrs.get("level").and_then(|v| v.as_u64()),
            )
        })
        .collect()
}

#[test]
fn heading_commands_update_block_and_query() {
    let mut editor = Editor::with_richtext_plugins();

    assert_eq!(
        editor
            .run_query::<Option<u64>>("block.heading_level", None)
            .unwrap(),
        None
    );

    editor
        .run_command("block.set_heading", Some(serde_json::json!({ "level": 2 })))
        .unwrap();

    assert_eq!(
        editor
            .run_query::<Option<u64>>("block.heading_level", None)
            .unwrap(),
        Some(2)
    );

    let Node::Element(block) = &editor.doc().children[0] else {
        panic!("expected element block");
    };
    assert_eq!(block.kind, "heading");
    assert_eq!(block.attrs.get("level").and_then(|v| v.as_u64()), Some(2));

    editor.run_command("block.unset_heading", None).unwrap();

    assert_eq!(
        editor
            .run_query::<Option<u64>>("block.heading_level", None)
            .unwrap(),
        None
    );

    let Node::Element(block) = &editor.doc().children[0] else {
        panic!("expected element block");
    };
    assert_eq!(block.kind, "paragraph");
    assert!(!block.attrs.contains_key("level"));
}

#[test]
fn heading_normalize_clamps_level_attr() {
    let mut attrs = Attrs::default();
    attrs.insert("level".to_string(), serde_json::json!(42));
    let doc = Document {
        children: vec![Node::Element(ElementNode {
            kind: "heading".to_string(),
            attrs,
            children: vec![Node::Text(TextNode {
                text: "x".to_string(),
            })],
        })],
    };
    let selection = RangeSelection::collapsed(Point::new(vec![0, 0], 0));
    let editor = Editor::new(doc, selection, PluginRegistry::richtext());

    assert_eq!(block_kinds(&editor), vec![("heading".to_string(), Some(6))]);
}

#[test]
fn set_heading_wraps_every_block_in_the_selection() {
    let mut editor = editor_with_paragraphs(
        &["one", "two", "three"],
        RangeSelection::new(Point::new(vec![0, 0], 1), Point::new(vec![1, 0], 2)),
    );

    editor
        .run_command("block.set_heading", Some(serde_json::json!({ "level": 3 })))
        .unwrap();

    assert_eq!(
        block_kinds(&editor),
        vec![
            ("heading".to_string(), Some(3)),
            ("heading".to_string(), Some(3)),
            ("paragraph".to_string(), None),
        ]
    );
    assert_eq!(editor.doc().plain_text(), "one\ntwo\nthree");
}

#[test]
fn set_heading_follows_backward_selections() {
    let mut editor = editor_with_paragraphs(
        &["one", "two", "three"],
        RangeSelection::new(Point::new(vec![2, 0], 0), Point::new(vec![1, 0], 1)),
    );

    editor
        .run_command("block.set_heading", Some(serde_json::json!({ "tag": "h1" })))
        .unwrap();

    assert_eq!(
        block_kinds(&editor),
        vec![
            ("paragraph".to_string(), None),
            ("heading".to_string(), Some(1)),
            ("heading".to_string(), Some(1)),
        ]
    );
    let range = editor.selection().as_range().unwrap();
    assert_eq!(range.anchor, Point::new(vec![2, 0], 0));
    assert_eq!(range.focus, Point::new(vec![1, 0], 1));
}

#[test]
fn set_heading_twice_is_a_no_op() {
    let mut editor = editor_with_paragraphs(
        &["title"],
        RangeSelection::collapsed(Point::new(vec![0, 0], 2)),
    );

    let args = Some(serde_json::json!({ "level": 2 }));
    editor.run_command("block.set_heading", args.clone()).unwrap();
    assert!(editor.can_undo());
    let after_first = editor.doc().clone();

    editor.undo().unwrap();
    editor.redo().unwrap();
    editor.run_command("block.set_heading", args).unwrap();
    assert_eq!(editor.doc(), &after_first);
}

#[test]
fn invalid_heading_levels_are_rejected_without_changes() {
    let mut editor = editor_with_paragraphs(
        &["body"],
        RangeSelection::collapsed(Point::new(vec![0, 0], 0)),
    );
    let before = editor.doc().clone();

    for args in [
        None,
        Some(serde_json::json!({ "level": 0 })),
        Some(serde_json::json!({ "level": 7 })),
        Some(serde_json::json!({ "tag": "h9" })),
        Some(serde_json::json!("h2")),
    ] {
        let err = editor.run_command("block.set_heading", args).unwrap_err();
        assert!(matches!(err, UpdateError::Command(_)), "{err}");
        assert_eq!(editor.doc(), &before);
    }
    assert!(!editor.can_undo());
}
