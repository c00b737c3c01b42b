// SPDX-License-Identifier: GPL-3.0-only

//! Terminal kiosk
//!
//! Renders the live preview and the finished composite to the terminal
//! using Unicode half-block characters, with the countdown, processing
//! status and the retrieval QR code drawn alongside.

use crate::backends::camera::{CameraFrame, FrameReceiver};
use crate::config::ThemeConfig;
use crate::constants::terminal::POLL_INTERVAL;
use crate::kiosk::Kiosk;
use crate::session::{QrPayload, SessionHandle, SessionState, SessionView};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use image::{GrayImage, Luma, RgbaImage};
use qrcode::render::unicode::Dense1x2;
use qrcode::types::QrError;
use qrcode::{Color as QrColor, QrCode};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::Widget,
};
use std::io::{self, stdout};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{error, info};

/// Modules of light border around rendered QR codes
const QR_QUIET_ZONE: u32 = 4;

/// QR code as terminal lines (two modules per character row)
pub fn qr_lines(text: &str) -> Result<Vec<String>, QrError> {
    let code = QrCode::new(text.as_bytes())?;
    let rendered = code
        .render::<Dense1x2>()
        .dark_color(Dense1x2::Light)
        .light_color(Dense1x2::Dark)
        .quiet_zone(true)
        .build();
    Ok(rendered.lines().map(str::to_string).collect())
}

/// QR code as a grayscale raster, `scale` pixels per module
pub fn qr_image(text: &str, scale: u32) -> Result<GrayImage, QrError> {
    let code = QrCode::new(text.as_bytes())?;
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let scale = scale.max(1);
    let side = (modules + QR_QUIET_ZONE * 2) * scale;

    Ok(GrayImage::from_fn(side, side, |x, y| {
        let mx = (x / scale).checked_sub(QR_QUIET_ZONE);
        let my = (y / scale).checked_sub(QR_QUIET_ZONE);
        match (mx, my) {
            (Some(mx), Some(my)) if mx < modules && my < modules => {
                match colors[(my * modules + mx) as usize] {
                    QrColor::Dark => Luma([0]),
                    QrColor::Light => Luma([255]),
                }
            }
            _ => Luma([255]),
        }
    }))
}

/// Run the terminal kiosk until the operator quits
pub fn run(runtime: &Runtime, kiosk: Kiosk) -> Result<(), Box<dyn std::error::Error>> {
    let session = runtime.block_on(async { kiosk.spawn_session() });

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, runtime, &kiosk, &session);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    runtime.block_on(session.shutdown());
    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    runtime: &Runtime,
    kiosk: &Kiosk,
    session: &SessionHandle,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = kiosk.config.subscribe();
    let mut theme = config.borrow_and_update().theme.clone();
    let mut preview: Option<FrameReceiver> = None;
    let mut mirror = false;
    let mut last_state: Option<SessionState> = None;
    let mut qr = QrCache::default();

    loop {
        if config.has_changed().unwrap_or(false) {
            theme = config.borrow_and_update().theme.clone();
        }

        let view = session.view();
        if last_state != Some(view.state) || (preview.is_none() && view.device_error.is_none()) {
            if view.state.is_capture_eligible() {
                preview = kiosk.devices.preview();
                mirror = kiosk.devices.selection().mirror_policy;
            } else {
                preview = None;
            }
            last_state = Some(view.state);
        }

        let picture = match (&view.composite, &preview) {
            (Some(composite), _) => Picture::Raster(Arc::clone(composite)),
            (None, Some(receiver)) => receiver
                .borrow()
                .as_ref()
                .map(|frame| Picture::Frame(Arc::clone(frame), mirror))
                .unwrap_or(Picture::Empty),
            (None, None) => Picture::Empty,
        };
        let qr_rows = qr.lines(view.qr.as_ref());

        terminal.draw(|f| {
            let area = f.area();
            let header_area = Rect { height: area.height.min(2), ..area };
            let status_area = Rect {
                y: area.y + area.height.saturating_sub(1),
                height: area.height.min(1),
                ..area
            };
            let mut body = Rect {
                y: area.y + header_area.height,
                height: area.height.saturating_sub(header_area.height + status_area.height),
                ..area
            };

            f.render_widget(Header { theme: &theme }, header_area);

            if let Some(lines) = qr_rows {
                let panel_width = lines
                    .iter()
                    .map(|l| l.chars().count() as u16)
                    .max()
                    .unwrap_or(0)
                    .saturating_add(2)
                    .min(body.width / 2);
                let panel = Rect {
                    x: body.x + body.width - panel_width,
                    width: panel_width,
                    ..body
                };
                body.width -= panel_width;
                f.render_widget(
                    QrPanel {
                        title: &theme.qr_scan_text,
                        lines,
                        cloud: view.qr.as_ref().is_some_and(QrPayload::is_cloud),
                    },
                    panel,
                );
            }

            f.render_widget(PictureWidget { picture: &picture }, body);
            f.render_widget(Overlay { view: &view }, body);

            let message = status_message(&view, &theme);
            f.render_widget(StatusBar { message: &message }, status_area);
        })?;

        // Handle input with timeout for frame updates
        if event::poll(POLL_INTERVAL)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            let sent = match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
                KeyCode::Char('q') => break,
                KeyCode::Char(' ') => runtime.block_on(session.start()),
                KeyCode::Char('r') => runtime.block_on(session.retake()),
                KeyCode::Char('d') => {
                    info!("Device refresh requested");
                    runtime.block_on(session.refresh_devices())
                }
                _ => Ok(()),
            };

            if let Err(e) = sent {
                error!(error = %e, "Session controller is gone");
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Rendered QR lines for the current payload
#[derive(Default)]
struct QrCache {
    payload: Option<QrPayload>,
    lines: Option<Vec<String>>,
}

impl QrCache {
    fn lines(&mut self, payload: Option<&QrPayload>) -> Option<&[String]> {
        if self.payload.as_ref() != payload {
            self.payload = payload.cloned();
            self.lines = payload.and_then(|p| match qr_lines(&p.text()) {
                Ok(lines) => Some(lines),
                Err(e) => {
                    error!(error = %e, "Failed to render QR code");
                    None
                }
            });
        }
        self.lines.as_deref()
    }
}

fn status_message(view: &SessionView, theme: &ThemeConfig) -> String {
    match view.state {
        SessionState::Idle => match &view.device_error {
            Some(e) => format!("{} | 'd' refresh devices | 'q' quit", e),
            None => format!(
                "'space' {} | 'd' refresh devices | 'q' quit",
                theme.capture_button_text
            ),
        },
        SessionState::CountingDown => "Get ready...".to_string(),
        SessionState::Capturing => "Capturing...".to_string(),
        SessionState::Remixing => format!("{}...", theme.shoot_with_mascot_text),
        SessionState::Compositing => "Framing your photo...".to_string(),
        SessionState::Uploading => "Uploading...".to_string(),
        SessionState::Ready => format!(
            "{} | 'r' {} | reset in {}s",
            theme.congrats_text,
            theme.retake_button_text,
            view.reset_remaining.unwrap_or(0)
        ),
        SessionState::Retaking => "Resetting...".to_string(),
    }
}

/// What the main area shows
enum Picture {
    Empty,
    /// Live preview frame, mirrored when the stream is
    Frame(Arc<CameraFrame>, bool),
    /// Finished composite
    Raster(Arc<RgbaImage>),
}

impl Picture {
    fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Picture::Empty => None,
            Picture::Frame(frame, _) => Some((frame.width, frame.height)),
            Picture::Raster(raster) => Some(raster.dimensions()),
        }
    }

    fn sample(&self, x: u32, y: u32) -> Color {
        let (r, g, b) = match self {
            Picture::Empty => (0, 0, 0),
            Picture::Frame(frame, mirror) => {
                let x = x.min(frame.width - 1);
                let x = if *mirror { frame.width - 1 - x } else { x };
                let y = y.min(frame.height - 1);
                let idx = ((y * frame.width + x) * 4) as usize;
                match frame.data.get(idx..idx + 3) {
                    Some(px) => (px[0], px[1], px[2]),
                    None => (0, 0, 0),
                }
            }
            Picture::Raster(raster) => {
                let px = raster.get_pixel(x.min(raster.width() - 1), y.min(raster.height() - 1));
                (px[0], px[1], px[2])
            }
        };
        Color::Rgb(r, g, b)
    }
}

/// Widget that renders a picture using half-block characters
struct PictureWidget<'a> {
    picture: &'a Picture,
}

impl Widget for PictureWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some((width, height)) = self.picture.dimensions().filter(|(w, h)| *w > 0 && *h > 0)
        else {
            let msg = "Waiting for camera...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, Style::default());
            }
            return;
        };

        // Each terminal cell displays 2 vertical pixels
        let aspect = width as f64 / height as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > aspect {
            let h = term_height;
            ((h * aspect) as u16, (h / 2.0) as u16)
        } else {
            let w = term_width;
            (w as u16, (w / aspect / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;
        let x_scale = width as f64 / display_width as f64;
        let y_scale = height as f64 / (display_height * 2) as f64;

        for ty in 0..display_height {
            for tx in 0..display_width {
                let src_x = (tx as f64 * x_scale) as u32;
                let top = self.picture.sample(src_x, (ty as f64 * 2.0 * y_scale) as u32);
                let bottom = self
                    .picture
                    .sample(src_x, ((ty as f64 * 2.0 + 1.0) * y_scale) as u32);

                if let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(top);
                    cell.set_bg(bottom);
                }
            }
        }
    }
}

/// Countdown digits and processing banner drawn over the picture
struct Overlay<'a> {
    view: &'a SessionView,
}

impl Widget for Overlay<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let text = match (self.view.state, self.view.countdown) {
            (SessionState::CountingDown, Some(n)) => format!("  {}  ", n),
            (SessionState::Remixing | SessionState::Compositing | SessionState::Uploading, _) => {
                " Creating your photo... ".to_string()
            }
            _ => return,
        };

        let x = area.x + (area.width.saturating_sub(text.len() as u16)) / 2;
        let y = area.y + area.height / 2;
        if y < area.y + area.height {
            buf.set_string(
                x,
                y,
                &text,
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::White)
                    .add_modifier(Modifier::BOLD),
            );
        }
    }
}

/// Event title and subtitle
struct Header<'a> {
    theme: &'a ThemeConfig,
}

impl Widget for Header<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let lines = [
            (
                self.theme.event_title.as_str(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            (self.theme.event_subtitle.as_str(), Style::default()),
        ];
        for (row, (text, style)) in lines.into_iter().enumerate().take(area.height as usize) {
            let width = text.chars().count() as u16;
            let x = area.x + area.width.saturating_sub(width) / 2;
            buf.set_stringn(x, area.y + row as u16, text, area.width as usize, style);
        }
    }
}

/// Retrieval QR code with its caption
struct QrPanel<'a> {
    title: &'a str,
    lines: &'a [String],
    cloud: bool,
}

impl Widget for QrPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let caption = if self.cloud {
            self.title
        } else {
            "Saved on this kiosk"
        };
        buf.set_stringn(area.x + 1, area.y, caption, area.width as usize, Style::default());

        for (row, line) in self.lines.iter().enumerate() {
            let y = area.y + 1 + row as u16;
            if y >= area.y + area.height {
                break;
            }
            buf.set_stringn(area.x + 1, y, line, area.width.saturating_sub(1) as usize, Style::default());
        }
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Fill background
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        buf.set_stringn(
            area.x,
            area.y,
            self.message,
            area.width as usize,
            Style::default().fg(Color::White).bg(Color::DarkGray),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DeviceError;

    #[test]
    fn test_qr_lines_are_square_ish() {
        let lines = qr_lines("https://example.com/photo.jpg").unwrap();
        assert!(!lines.is_empty());
        let width = lines[0].chars().count();
        // Two modules per row
        assert!((lines.len() * 2).abs_diff(width) <= 2);
    }

    #[test]
    fn test_qr_image_has_quiet_zone() {
        let img = qr_image("hello", 2).unwrap();
        assert_eq!(img.width(), img.height());
        assert_eq!(img.get_pixel(0, 0), &Luma([255]));
    }

    #[test]
    fn test_status_mentions_device_error() {
        let view = SessionView {
            device_error: Some(DeviceError::NoCameraFound),
            ..SessionView::default()
        };
        let message = status_message(&view, &ThemeConfig::default());
        assert!(message.contains("No camera devices found"));
    }

    #[test]
    fn test_mirrored_frame_sampling() {
        let frame = CameraFrame::from_rgba(2, 1, vec![10, 0, 0, 255, 20, 0, 0, 255], 0);
        let picture = Picture::Frame(Arc::new(frame), true);
        assert_eq!(picture.sample(0, 0), Color::Rgb(20, 0, 0));
    }
}
