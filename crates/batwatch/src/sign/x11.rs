use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use x11rb::COPY_DEPTH_FROM_PARENT;
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::{
    Char2b, ConnectionExt, CreateGCAux, CreateWindowAux, EventMask, Gcontext, Window, WindowClass,
};
use x11rb::rust_connection::RustConnection;

use super::{SignBackend, SignError};

const WIN_X: i16 = 0;
const WIN_Y: i16 = 0;
const PADDING: i16 = 10;
/// How often the worker checks its stop token between display events.
const EVENT_POLL: Duration = Duration::from_millis(50);

/// Renders signs as small override-redirect windows in the top-left
/// screen corner, white text on red.
///
/// Each worker opens its own connection, so no two workers ever share
/// display state; dropping the connection releases every resource the
/// worker created.
pub struct X11Backend {
    font: String,
}

impl X11Backend {
    pub fn new(font: impl Into<String>) -> Self {
        Self { font: font.into() }
    }
}

impl SignBackend for X11Backend {
    fn run(&self, label: &'static str, stop: CancellationToken) -> Result<(), SignError> {
        let (conn, screen_num) =
            x11rb::connect(None).map_err(|e| SignError::Connect(e.to_string()))?;
        let screen = &conn.setup().roots[screen_num];
        let colormap = screen.default_colormap;
        let root = screen.root;

        let background = conn
            .alloc_named_color(colormap, b"red")
            .map_err(win_err)?
            .reply()
            .map_err(win_err)?
            .pixel;
        let foreground = conn
            .alloc_named_color(colormap, b"white")
            .map_err(win_err)?
            .reply()
            .map_err(win_err)?
            .pixel;

        let font = conn.generate_id().map_err(win_err)?;
        conn.open_font(font, self.font.as_bytes())
            .map_err(win_err)?
            .check()
            .map_err(|_| SignError::Font(self.font.clone()))?;

        // Size the window to fit one line of label text plus padding.
        let chars: Vec<Char2b> = label
            .bytes()
            .map(|b| Char2b { byte1: 0, byte2: b })
            .collect();
        let extents = conn
            .query_text_extents(font, &chars)
            .map_err(win_err)?
            .reply()
            .map_err(win_err)?;
        let text_x = PADDING;
        let text_y = extents.font_ascent.saturating_add(PADDING);
        let (width, height) =
            window_size(extents.overall_width, text_y, extents.font_descent);

        let win = conn.generate_id().map_err(win_err)?;
        let attrs = CreateWindowAux::new()
            .background_pixel(background)
            .override_redirect(1)
            .event_mask(EventMask::EXPOSURE | EventMask::STRUCTURE_NOTIFY);
        conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            win,
            root,
            WIN_X,
            WIN_Y,
            width,
            height,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &attrs,
        )
        .map_err(win_err)?;

        let gc = conn.generate_id().map_err(win_err)?;
        conn.create_gc(
            gc,
            win,
            &CreateGCAux::new()
                .foreground(foreground)
                .background(background)
                .font(font),
        )
        .map_err(win_err)?;

        conn.map_window(win).map_err(win_err)?;
        conn.flush().map_err(win_err)?;

        // Redraw on expose/map until the controller signals teardown.
        // poll_for_event keeps the thread responsive to the token.
        loop {
            if stop.is_cancelled() {
                return Ok(());
            }
            match conn.poll_for_event().map_err(win_err)? {
                Some(Event::Expose(e)) if e.count == 0 => {
                    draw(&conn, win, gc, text_x, text_y, label)?;
                }
                Some(Event::MapNotify(_)) => {
                    draw(&conn, win, gc, text_x, text_y, label)?;
                }
                Some(_) => {}
                None => thread::sleep(EVENT_POLL),
            }
        }
    }
}

fn draw(
    conn: &RustConnection,
    win: Window,
    gc: Gcontext,
    x: i16,
    y: i16,
    label: &str,
) -> Result<(), SignError> {
    conn.image_text8(win, gc, x, y, label.as_bytes())
        .map_err(win_err)?;
    conn.flush().map_err(win_err)?;
    Ok(())
}

fn win_err(e: impl std::fmt::Display) -> SignError {
    SignError::Window(e.to_string())
}

// Text extents are server-reported and unbounded on paper; keep the
// window dimensions inside the protocol's u16 range.
fn window_size(overall_width: i32, text_y: i16, descent: i16) -> (u16, u16) {
    let width = overall_width.saturating_add(2 * i32::from(PADDING)).max(1);
    let height = i32::from(text_y)
        .saturating_add(i32::from(descent))
        .saturating_add(i32::from(PADDING))
        .max(1);
    (
        u16::try_from(width).unwrap_or(u16::MAX),
        u16::try_from(height).unwrap_or(u16::MAX),
    )
}
