mod support;

use manos_plate_core::{
    Document, Editor, ElementNode, HeadingTag, Node, Op, PARAGRAPH_KIND, PlatePlugin,
    PluginRegistry, Point, RangeSelection, Transaction, UpdateError,
};
use manos_plate_toolbar::{BlockType, Toolbar, ToolbarAction, ToolbarConfig, ToolbarError};

use support::{FakeSurface, INSIDE};

fn editor(children: Vec<Node>) -> Editor {
    Editor::new(
        Document { children },
        RangeSelection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::richtext(),
    )
}

fn select(editor: &mut Editor, anchor: (Vec<usize>, usize), focus: (Vec<usize>, usize)) {
    editor
        .set_selection(RangeSelection::new(
            Point::new(anchor.0, anchor.1),
            Point::new(focus.0, focus.1),
        ))
        .unwrap();
}

#[test]
fn heading_button_scenario() {
    let mut editor = editor(vec![Node::paragraph("first para"), Node::paragraph("second")]);
    let toolbar = Toolbar::mount(&editor, ToolbarConfig::default()).unwrap();

    select(&mut editor, (vec![0, 0], 0), (vec![0, 0], 5));
    assert_eq!(toolbar.block_type(), BlockType::Paragraph);

    assert!(toolbar.format_heading(&mut editor, HeadingTag::H2).unwrap());
    assert_eq!(toolbar.block_type(), BlockType::H2);

    select(&mut editor, (vec![1, 0], 2), (vec![1, 0], 2));
    assert_eq!(toolbar.block_type(), BlockType::Paragraph);
}

#[test]
fn format_heading_is_idempotent() {
    let mut editor = editor(vec![Node::paragraph("title")]);
    let toolbar = Toolbar::mount(&editor, ToolbarConfig::default()).unwrap();

    assert!(toolbar.format_heading(&mut editor, HeadingTag::H1).unwrap());
    let after_once = editor.doc().clone();

    assert!(!toolbar.format_heading(&mut editor, HeadingTag::H1).unwrap());
    assert_eq!(editor.doc(), &after_once);
    assert_eq!(toolbar.block_type(), BlockType::H1);

    editor.undo().unwrap();
    assert!(!editor.can_undo());
    assert_eq!(toolbar.block_type(), BlockType::Paragraph);
}

#[test]
fn block_type_comes_from_the_top_level_block() {
    let mut editor = editor(vec![
        Node::heading(HeadingTag::H4, "deep"),
        Node::Element(ElementNode {
            kind: PARAGRAPH_KIND.to_string(),
            attrs: Default::default(),
            children: vec![Node::text("x "), Node::link("https://a.dev", "link")],
        }),
        Node::element("quote", vec![Node::text("custom")]),
    ]);
    let toolbar = Toolbar::mount(&editor, ToolbarConfig::default()).unwrap();
    assert_eq!(toolbar.block_type(), BlockType::H4);

    select(&mut editor, (vec![1, 1, 0], 1), (vec![1, 1, 0], 1));
    assert_eq!(toolbar.block_type(), BlockType::Paragraph);

    select(&mut editor, (vec![0, 0], 1), (vec![0, 0], 3));
    assert_eq!(toolbar.block_type(), BlockType::H4);

    select(&mut editor, (vec![2, 0], 1), (vec![2, 0], 1));
    assert_eq!(toolbar.block_type(), BlockType::Paragraph);

    // Anchor on the root itself.
    select(&mut editor, (vec![], 0), (vec![], 3));
    assert_eq!(toolbar.block_type(), BlockType::Paragraph);
}

#[test]
fn buttons_reflect_the_block_type() {
    let mut editor = editor(vec![Node::heading(HeadingTag::H2, "title")]);
    let toolbar = Toolbar::mount(&editor, ToolbarConfig::default()).unwrap();

    let buttons = toolbar.buttons();
    let labels: Vec<&str> = buttons.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["H1", "H2", "H3", "LK", "MD"]);
    assert!(buttons.iter().all(|b| b.role == "checkbox"));
    let checked: Vec<&str> = buttons
        .iter()
        .filter(|b| b.aria_checked)
        .map(|b| b.aria_label.as_str())
        .collect();
    assert_eq!(checked, vec!["Heading 2"]);
    assert_eq!(buttons[0].title, "Heading 1");

    assert!(toolbar
        .activate(&mut editor, ToolbarAction::Heading(HeadingTag::H3))
        .unwrap());
    assert_eq!(toolbar.block_type(), BlockType::H3);
    assert!(toolbar.buttons()[2].aria_checked);
}

#[test]
fn configured_heading_buttons() {
    let editor = editor(vec![Node::paragraph("x")]);
    let config = ToolbarConfig {
        heading_buttons: vec![HeadingTag::H5],
        ..Default::default()
    };
    let toolbar = Toolbar::mount(&editor, config).unwrap();
    let actions: Vec<ToolbarAction> = toolbar.buttons().iter().map(|b| b.action).collect();
    assert_eq!(
        actions,
        vec![
            ToolbarAction::Heading(HeadingTag::H5),
            ToolbarAction::ToggleLink,
            ToolbarAction::ShowLinkEditor,
        ]
    );
}

#[test]
fn link_field_only_follows_links() {
    let mut editor = editor(vec![Node::Element(ElementNode {
        kind: PARAGRAPH_KIND.to_string(),
        attrs: Default::default(),
        children: vec![Node::text("see "), Node::link("https://a.dev", "here")],
    })]);
    let toolbar = Toolbar::mount(&editor, ToolbarConfig::default()).unwrap();

    toolbar.set_url("https://typed.dev");
    select(&mut editor, (vec![0, 0], 1), (vec![0, 0], 2));
    assert_eq!(toolbar.url(), "https://typed.dev");

    select(&mut editor, (vec![0, 1, 0], 1), (vec![0, 1, 0], 1));
    assert_eq!(toolbar.url(), "https://a.dev");

    toolbar.set_url("https://typed.dev");
    editor.click().unwrap();
    assert_eq!(toolbar.url(), "https://a.dev");
}

#[test]
fn submit_url_links_and_unlinks_the_selection() {
    let mut editor = editor(vec![Node::paragraph("hello world")]);
    let toolbar = Toolbar::mount(&editor, ToolbarConfig::default()).unwrap();
    select(&mut editor, (vec![0, 0], 0), (vec![0, 0], 5));

    toolbar.set_url("https://example.com");
    assert!(toolbar.submit_url(&mut editor).unwrap());
    assert_eq!(
        toolbar.export_html(&editor),
        r#"<p><a href="https://example.com">hello</a> world</p>"#
    );

    toolbar.set_url("");
    assert!(toolbar.activate(&mut editor, ToolbarAction::ToggleLink).unwrap());
    assert_eq!(toolbar.export_html(&editor), "<p>hello world</p>");
}

#[test]
fn show_link_editor_mounts_an_overlay() {
    let mut editor = editor(vec![Node::paragraph("hello")]);
    editor.set_root_element(Some(support::ROOT));
    let toolbar = Toolbar::mount(&editor, ToolbarConfig::default()).unwrap();
    let overlay = toolbar.show_link_editor(&editor, FakeSurface::new());
    overlay.with_surface_mut(|surface| {
        surface.select(INSIDE, manos_plate_toolbar::Rect::new(0.0, 0.0, 20.0, 10.0))
    });

    select(&mut editor, (vec![0, 0], 0), (vec![0, 0], 5));
    assert!(overlay.state().is_visible());
    assert!(!toolbar.activate(&mut editor, ToolbarAction::ShowLinkEditor).unwrap());
}

#[test]
fn missing_block_ancestor_is_an_invariant_violation() {
    // No normalization: a bare text node can sit directly under the root.
    let registry = PluginRegistry::new(Vec::<Box<dyn PlatePlugin>>::new()).unwrap();
    let doc = Document {
        children: vec![Node::text("loose")],
    };
    let mut editor = Editor::new(
        doc,
        RangeSelection::collapsed(Point::new(vec![0], 1)),
        registry,
    );

    let err = Toolbar::mount(&editor, ToolbarConfig::default()).err().unwrap();
    assert!(matches!(err, ToolbarError::Invariant(_)));

    editor
        .set_selection(RangeSelection::collapsed(Point::new(vec![], 0)))
        .unwrap();
    let toolbar = Toolbar::mount(&editor, ToolbarConfig::default()).unwrap();
    let err = editor
        .set_selection(RangeSelection::collapsed(Point::new(vec![0], 2)))
        .unwrap_err();
    assert!(matches!(err, UpdateError::Listener(_)));
    assert_eq!(toolbar.block_type(), BlockType::Paragraph);
}

#[test]
fn failed_commands_leave_toolbar_and_document_unchanged() {
    let mut editor = editor(vec![Node::paragraph("body")]);
    let toolbar = Toolbar::mount(&editor, ToolbarConfig::default()).unwrap();
    let before = editor.doc().clone();

    let err = editor
        .update(|scope| {
            scope.apply(Transaction::new(vec![Op::InsertText {
                path: vec![0, 0],
                offset: 0,
                text: "x".to_string(),
            }]))?;
            scope.apply(Transaction::new(vec![Op::RemoveNode { path: vec![9] }]))?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, UpdateError::Apply(_)));
    assert_eq!(editor.doc(), &before);
    assert_eq!(toolbar.block_type(), BlockType::Paragraph);
}

#[test]
fn dropping_the_toolbar_unregisters_everything() {
    let editor = editor(vec![Node::paragraph("x")]);
    let toolbar = Toolbar::mount(&editor, ToolbarConfig::default()).unwrap();
    assert_eq!(editor.listener_count(), 3);
    drop(toolbar);
    assert_eq!(editor.listener_count(), 0);
}
