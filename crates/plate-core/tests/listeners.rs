use std::cell::RefCell;
use std::rc::Rc;

use manos_plate_core::{
    CommandPriority, Editor, ListenerError, Op, Point, RangeSelection, SELECTION_CHANGE_COMMAND,
    Subscription, Transaction, UpdateError,
};
use serde_json::json;

fn insert(editor: &mut Editor, text: &str) {
    editor
        .apply(Transaction::new(vec![Op::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: text.to_string(),
        }]))
        .unwrap();
}

#[test]
fn update_listeners_see_committed_state() {
    let mut editor = Editor::with_richtext_plugins();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let _subscription = editor.register_update_listener({
        let seen = seen.clone();
        move |view| {
            seen.borrow_mut().push(view.state().doc().plain_text());
            Ok(())
        }
    });

    insert(&mut editor, "hi");
    insert(&mut editor, "oh ");
    assert_eq!(*seen.borrow(), vec!["hi".to_string(), "oh hi".to_string()]);
}

#[test]
fn dropping_a_subscription_unregisters() {
    let mut editor = Editor::with_richtext_plugins();
    let calls = Rc::new(RefCell::new(0));

    let subscription = editor.register_update_listener({
        let calls = calls.clone();
        move |_| {
            *calls.borrow_mut() += 1;
            Ok(())
        }
    });
    assert_eq!(editor.listener_count(), 1);

    insert(&mut editor, "a");
    drop(subscription);
    insert(&mut editor, "b");

    assert_eq!(*calls.borrow(), 1);
    assert_eq!(editor.listener_count(), 0);
}

#[test]
fn subscriptions_outliving_the_editor_drop_cleanly() {
    let editor = Editor::with_richtext_plugins();
    let subscription = Subscription::merge([
        editor.register_update_listener(|_| Ok(())),
        editor.register_command(SELECTION_CHANGE_COMMAND, CommandPriority::Low, |_, _| {
            Ok(false)
        }),
    ]);
    assert_eq!(editor.listener_count(), 2);
    drop(editor);
    drop(subscription);
}

#[test]
fn command_handlers_run_by_priority_until_handled() {
    let mut editor = Editor::with_richtext_plugins();
    let order = Rc::new(RefCell::new(Vec::new()));

    let register = |priority: CommandPriority, name: &'static str, handled: bool| {
        let order = order.clone();
        editor.register_command("custom.ping", priority, move |payload, _view| {
            order.borrow_mut().push((name, payload.clone()));
            Ok(handled)
        })
    };
    let _low = register(CommandPriority::Low, "low", false);
    let _critical = register(CommandPriority::Critical, "critical", false);
    let _normal = register(CommandPriority::Normal, "normal", true);
    let _editor = register(CommandPriority::Editor, "editor", false);

    assert!(editor.dispatch_command("custom.ping", json!(1)).unwrap());
    assert_eq!(
        *order.borrow(),
        vec![("critical", json!(1)), ("normal", json!(1))]
    );

    assert!(!editor.dispatch_command("custom.unknown", json!(null)).unwrap());
}

#[test]
fn set_selection_dispatches_selection_change_after_commit() {
    let mut editor = Editor::with_richtext_plugins();
    insert(&mut editor, "abc");
    let seen = Rc::new(RefCell::new(Vec::new()));

    let _subscription = editor.register_command(
        SELECTION_CHANGE_COMMAND,
        CommandPriority::Low,
        {
            let seen = seen.clone();
            move |_, view| {
                let focus = view.state().selection().as_range().map(|r| r.focus.offset);
                seen.borrow_mut().push(focus);
                Ok(false)
            }
        },
    );

    let selection = RangeSelection::new(Point::new(vec![0, 0], 1), Point::new(vec![0, 0], 3));
    editor.set_selection(selection.clone()).unwrap();
    editor.set_selection(selection).unwrap();

    assert_eq!(*seen.borrow(), vec![Some(3)]);
}

#[test]
fn listener_errors_surface_after_the_commit() {
    let mut editor = Editor::with_richtext_plugins();
    let _subscription =
        editor.register_update_listener(|_| Err(ListenerError::new("listener exploded")));

    let err = editor
        .apply(Transaction::new(vec![Op::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: "kept".to_string(),
        }]))
        .unwrap_err();

    assert!(matches!(err, UpdateError::Listener(_)));
    assert_eq!(editor.doc().plain_text(), "kept");
}

#[test]
fn reads_are_scoped_to_the_state() {
    let editor = Editor::with_richtext_plugins();
    let (root_type, block_type, key) = editor.read(|ctx| {
        let root = ctx.root();
        let text = ctx.node_at(&[0, 0]).unwrap();
        let block = text.top_level_element().unwrap();
        (
            root.node_type().to_string(),
            block.node_type().to_string(),
            text.key(),
        )
    });
    assert_eq!(root_type, "root");
    assert_eq!(block_type, "paragraph");
    assert_eq!(key.to_string(), "0.0");
}
