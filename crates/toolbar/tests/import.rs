use std::cell::RefCell;
use std::rc::Rc;

use manos_plate_core::{Editor, Point, RangeSelection};
use manos_plate_toolbar::{HtmlImportBridge, ImportState, Toolbar, ToolbarConfig};

const FRAGMENT: &str = r#"test<a href="https://example.com">link</a>tail"#;

#[test]
fn fragment_is_imported_exactly_once() {
    let mut editor = Editor::with_richtext_plugins();
    let notifications = Rc::new(RefCell::new(0));
    let _subscription = editor.register_update_listener({
        let notifications = notifications.clone();
        move |_| {
            *notifications.borrow_mut() += 1;
            Ok(())
        }
    });

    let mut bridge = HtmlImportBridge::new(FRAGMENT);
    assert_eq!(bridge.state(), &ImportState::Pending(FRAGMENT.to_string()));
    assert!(bridge.run(&mut editor).unwrap());
    assert!(bridge.is_imported());

    let block = editor.read(|ctx| ctx.node_at(&[0]).unwrap().node().cloned().unwrap());
    let manos_plate_core::Node::Element(block) = block else {
        panic!("expected paragraph");
    };
    assert_eq!(block.children.len(), 3);
    let count_once = editor.doc().node_count();
    assert_eq!(*notifications.borrow(), 1);

    editor
        .set_selection(RangeSelection::collapsed(Point::new(vec![0, 0], 1)))
        .unwrap();
    assert!(!bridge.run(&mut editor).unwrap());
    assert!(!bridge.run(&mut editor).unwrap());

    assert_eq!(editor.doc().node_count(), count_once);
    assert_eq!(*notifications.borrow(), 2);
}

#[test]
fn imported_content_drives_the_toolbar() {
    let mut editor = Editor::with_richtext_plugins();
    let toolbar = Toolbar::mount(&editor, ToolbarConfig::default()).unwrap();
    HtmlImportBridge::new("<h3>Intro</h3><p>body</p>")
        .run(&mut editor)
        .unwrap();

    assert_eq!(toolbar.export_html(&editor), "<h3>Intro</h3><p>body</p>");
    editor
        .set_selection(RangeSelection::collapsed(Point::new(vec![0, 0], 2)))
        .unwrap();
    assert_eq!(toolbar.block_type().as_str(), "h3");
}

#[test]
fn malformed_markup_is_accepted_as_is() {
    let mut editor = Editor::with_richtext_plugins();
    let mut bridge = HtmlImportBridge::new("<p>unclosed <a href='x'>dangling");
    assert!(bridge.run(&mut editor).unwrap());
    assert_eq!(editor.doc().plain_text(), "unclosed dangling");

    let mut empty = HtmlImportBridge::new("");
    assert!(empty.run(&mut editor).unwrap());
    assert_eq!(editor.doc().plain_text(), "unclosed dangling");
}
