// src/overlay.rs
//
// Annotated-frame rendering: counting line with IN/OUT labels, track boxes
// with IDs, bottom dashboard strip and alert banner. Returns a BGR Mat
// ready for the video writer.

use anyhow::Result;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
};

use crate::counting::{AlertLevel, CountingLine, LedgerSnapshot};
use crate::tracker::Track;

// BGR palette, matching the dashboard color scheme.
fn color_primary() -> core::Scalar {
    core::Scalar::new(255.0, 140.0, 0.0, 0.0)
}
fn color_success() -> core::Scalar {
    core::Scalar::new(0.0, 255.0, 0.0, 0.0)
}
fn color_info() -> core::Scalar {
    core::Scalar::new(255.0, 200.0, 0.0, 0.0)
}
fn color_dark() -> core::Scalar {
    core::Scalar::new(40.0, 40.0, 40.0, 0.0)
}
fn color_light() -> core::Scalar {
    core::Scalar::new(240.0, 240.0, 240.0, 0.0)
}
fn color_white() -> core::Scalar {
    core::Scalar::new(255.0, 255.0, 255.0, 0.0)
}
fn color_accent() -> core::Scalar {
    core::Scalar::new(255.0, 0.0, 255.0, 0.0)
}

fn alert_color(level: AlertLevel) -> core::Scalar {
    match level {
        AlertLevel::Normal => color_success(),
        AlertLevel::Warning => core::Scalar::new(0.0, 165.0, 255.0, 0.0),
        AlertLevel::Critical => core::Scalar::new(0.0, 0.0, 255.0, 0.0),
    }
}

pub fn draw_overlay(
    frame: &[u8],
    width: i32,
    height: i32,
    line: &CountingLine,
    tracks: &[&Track],
    snapshot: &LedgerSnapshot,
    alert: AlertLevel,
    fps: f64,
) -> Result<Mat> {
    let flat = Mat::from_slice(frame)?;
    let rgb = flat.reshape(3, height)?;
    let mut output = Mat::default();
    imgproc::cvt_color(&rgb, &mut output, imgproc::COLOR_RGB2BGR, 0)?;

    draw_counting_line(&mut output, line, snapshot)?;
    for track in tracks {
        draw_track(&mut output, track)?;
    }
    draw_dashboard(&mut output, width, height, snapshot, alert, fps)?;

    if alert != AlertLevel::Normal {
        let banner = if alert == AlertLevel::Critical {
            "! OVERCROWDING ALERT !"
        } else {
            "! NEAR CAPACITY !"
        };
        imgproc::put_text(
            &mut output,
            banner,
            core::Point::new(width / 2 - 200, 60),
            imgproc::FONT_HERSHEY_DUPLEX,
            1.0,
            alert_color(alert),
            2,
            imgproc::LINE_AA,
            false,
        )?;
    }

    Ok(output)
}

fn draw_counting_line(output: &mut Mat, line: &CountingLine, snapshot: &LedgerSnapshot) -> Result<()> {
    let p1 = core::Point::new(line.start[0] as i32, line.start[1] as i32);
    let p2 = core::Point::new(line.end[0] as i32, line.end[1] as i32);

    imgproc::line(output, p1, p2, color_white(), 6, imgproc::LINE_AA, 0)?;
    imgproc::line(output, p1, p2, color_accent(), 3, imgproc::LINE_AA, 0)?;

    let (mx, my) = line.midpoint();
    let (mid_x, mid_y) = (mx as i32, my as i32);

    imgproc::arrowed_line(
        output,
        core::Point::new(mid_x - 60, mid_y - 40),
        core::Point::new(mid_x - 60, mid_y - 10),
        color_success(),
        3,
        imgproc::LINE_AA,
        0,
        0.4,
    )?;
    imgproc::put_text(
        output,
        &format!("IN: {}", snapshot.entered),
        core::Point::new(mid_x - 100, mid_y - 50),
        imgproc::FONT_HERSHEY_DUPLEX,
        0.6,
        color_success(),
        2,
        imgproc::LINE_AA,
        false,
    )?;

    imgproc::arrowed_line(
        output,
        core::Point::new(mid_x + 60, mid_y + 10),
        core::Point::new(mid_x + 60, mid_y + 40),
        color_info(),
        3,
        imgproc::LINE_AA,
        0,
        0.4,
    )?;
    imgproc::put_text(
        output,
        &format!("OUT: {}", snapshot.exited),
        core::Point::new(mid_x + 40, mid_y + 60),
        imgproc::FONT_HERSHEY_DUPLEX,
        0.6,
        color_info(),
        2,
        imgproc::LINE_AA,
        false,
    )?;

    Ok(())
}

fn draw_track(output: &mut Mat, track: &Track) -> Result<()> {
    let [x1, y1, x2, y2] = track.bbox;
    let rect = core::Rect::new(
        x1 as i32,
        y1 as i32,
        (x2 - x1).max(1.0) as i32,
        (y2 - y1).max(1.0) as i32,
    );
    imgproc::rectangle(output, rect, color_primary(), 2, imgproc::LINE_8, 0)?;

    let (cx, cy) = track.center();
    let center = core::Point::new(cx as i32, cy as i32);
    imgproc::circle(output, center, 6, color_white(), -1, imgproc::LINE_8, 0)?;
    imgproc::circle(output, center, 4, color_primary(), -1, imgproc::LINE_8, 0)?;

    let label_bg = core::Rect::new(x1 as i32, y1 as i32 - 20, 70, 20);
    imgproc::rectangle(output, label_bg, color_primary(), -1, imgproc::LINE_8, 0)?;
    imgproc::put_text(
        output,
        &format!("ID:{}", track.id),
        core::Point::new(x1 as i32 + 4, y1 as i32 - 5),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        color_white(),
        1,
        imgproc::LINE_AA,
        false,
    )?;

    Ok(())
}

fn draw_dashboard(
    output: &mut Mat,
    width: i32,
    height: i32,
    snapshot: &LedgerSnapshot,
    alert: AlertLevel,
    fps: f64,
) -> Result<()> {
    let panel_height = 60;
    imgproc::rectangle(
        output,
        core::Rect::new(0, height - panel_height, width, panel_height),
        color_dark(),
        -1,
        imgproc::LINE_8,
        0,
    )?;

    imgproc::put_text(
        output,
        &format!("IN: {}", snapshot.entered),
        core::Point::new(10, height - 32),
        imgproc::FONT_HERSHEY_DUPLEX,
        0.7,
        color_success(),
        1,
        imgproc::LINE_AA,
        false,
    )?;
    imgproc::put_text(
        output,
        &format!("OUT: {}", snapshot.exited),
        core::Point::new(width / 3, height - 32),
        imgproc::FONT_HERSHEY_DUPLEX,
        0.7,
        color_info(),
        1,
        imgproc::LINE_AA,
        false,
    )?;
    imgproc::put_text(
        output,
        &format!("NOW: {}", snapshot.occupancy),
        core::Point::new(2 * width / 3, height - 32),
        imgproc::FONT_HERSHEY_DUPLEX,
        0.7,
        alert_color(alert),
        1,
        imgproc::LINE_AA,
        false,
    )?;
    imgproc::put_text(
        output,
        &format!("STATUS: {} | FPS: {:.1}", alert.as_str(), fps),
        core::Point::new(10, height - 8),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.45,
        color_light(),
        1,
        imgproc::LINE_AA,
        false,
    )?;

    Ok(())
}
