mod surface;

use anyhow::Context as _;
use manos_plate_core::{Editor, ElementHandle, HeadingTag, Point, RangeSelection};
use manos_plate_toolbar::{HtmlImportBridge, Rect, ScrollOffset, Toolbar, ToolbarConfig};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use crate::surface::HeadlessSurface;

const INITIAL_HTML: &str = r#"test<a href="https://example.com">link</a>tail"#;

fn load_config(path: Option<String>) -> anyhow::Result<ToolbarConfig> {
    let Some(path) = path else {
        return Ok(ToolbarConfig::default());
    };
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("reading toolbar config {path}"))?;
    ToolbarConfig::from_json(&json).with_context(|| format!("parsing toolbar config {path}"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let config = load_config(std::env::args().nth(1))?;
    let root = ElementHandle(1);

    let mut editor = Editor::with_richtext_plugins();
    editor.set_root_element(Some(root));

    let toolbar = Toolbar::mount(&editor, config).context("mounting toolbar")?;
    let mut import = HtmlImportBridge::new(INITIAL_HTML);
    import.run(&mut editor).context("importing initial html")?;
    import.run(&mut editor)?;
    info!(nodes = editor.doc().node_count(), "document ready");

    let overlay = toolbar.show_link_editor(&editor, HeadlessSurface::new(root));
    overlay.with_surface_mut(|surface| {
        surface.scroll = ScrollOffset { x: 0.0, y: 120.0 };
        surface.select(Rect::new(50.0, 100.0, 40.0, 20.0));
    });

    // Select "test", make it an H2, then link it.
    editor.set_selection(RangeSelection::new(
        Point::new(vec![0, 0], 0),
        Point::new(vec![0, 0], 4),
    ))?;
    toolbar.format_heading(&mut editor, HeadingTag::H2)?;
    info!(block_type = %toolbar.block_type(), "formatted heading");

    toolbar.set_url("https://example.org/docs");
    toolbar.submit_url(&mut editor)?;

    // Select inside the imported link.
    editor.set_selection(RangeSelection::new(
        Point::new(vec![0, 1, 0], 0),
        Point::new(vec![0, 1, 0], 2),
    ))?;
    editor.click()?;

    let position = overlay.position();
    info!(
        url = %toolbar.url(),
        overlay_url = %overlay.link_state().url,
        top = position.top,
        left = position.left,
        opacity = position.opacity,
        "link state"
    );
    if let Some(placed) = overlay.with_surface(|surface| surface.placed) {
        info!(top = placed.top, left = placed.left, "last overlay placement");
    }
    for button in toolbar.buttons() {
        info!(label = %button.label, checked = button.aria_checked, "button");
    }

    println!("{}", toolbar.export_html(&editor));
    Ok(())
}
