use manos_plate_core::{
    Document, Editor, ElementNode, HeadingTag, Node, PARAGRAPH_KIND, PluginRegistry, Point,
    RangeSelection, html,
};

const FRAGMENT: &str = r#"test<a href="https://example.com">link</a>tail"#;

fn import(editor: &mut Editor, markup: &str) {
    let nodes = html::nodes_from_html(markup);
    editor
        .update(|scope| {
            scope.select_root();
            scope.insert_nodes(nodes)?;
            Ok(())
        })
        .unwrap();
}

#[test]
fn inline_nodes_replace_a_pristine_document() {
    let mut editor = Editor::with_richtext_plugins();
    import(&mut editor, FRAGMENT);

    assert_eq!(
        editor.doc().children,
        vec![Node::Element(ElementNode {
            kind: PARAGRAPH_KIND.to_string(),
            attrs: Default::default(),
            children: vec![
                Node::text("test"),
                Node::link("https://example.com", "link"),
                Node::text("tail"),
            ],
        })]
    );
    assert_eq!(
        editor.selection().as_range().unwrap().focus,
        Point::new(vec![0, 2], 4)
    );
    assert_eq!(
        html::html_from_document(editor.doc()),
        r#"<p>test<a href="https://example.com">link</a>tail</p>"#
    );
    assert!(editor.can_undo());
}

#[test]
fn blocks_are_appended_after_existing_content() {
    let doc = Document {
        children: vec![Node::paragraph("existing")],
    };
    let mut editor = Editor::new(
        doc,
        RangeSelection::collapsed(Point::new(vec![0, 0], 3)),
        PluginRegistry::richtext(),
    );
    import(&mut editor, "<h1>Title</h1>after");

    assert_eq!(
        editor.doc().children,
        vec![
            Node::paragraph("existing"),
            Node::heading(HeadingTag::H1, "Title"),
            Node::paragraph("after"),
        ]
    );
}

#[test]
fn empty_markup_changes_nothing() {
    let mut editor = Editor::with_richtext_plugins();
    let before = editor.doc().clone();
    import(&mut editor, "<!-- nothing -->");
    assert_eq!(editor.doc(), &before);
}
