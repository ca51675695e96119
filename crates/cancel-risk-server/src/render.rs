use cancel_risk_core::schema::{LeadTimeRange, RiskOutcome, RiskSeries};
use std::fmt::Write;

pub const NO_DATA_WARNING: &str = "No data found for the selected hotel.";

const WIDTH: f64 = 720.0;
const HEIGHT: f64 = 380.0;
const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_TOP: f64 = 20.0;
const MARGIN_BOTTOM: f64 = 52.0;
const LINE_COLOR: &str = "royalblue";

/// 页面自包含：内联 CSS + 内联 SVG + 普通 GET 表单，不依赖前端资源
pub struct PageView<'a> {
    pub hotels: &'a [String],
    pub selected: &'a str,
    pub outcome: &'a RiskOutcome,
    /// 表单输入有误时的提示，内联显示在图表上方
    pub error: Option<&'a str>,
}

pub fn render_page(view: &PageView<'_>) -> String {
    let body = match view.outcome {
        RiskOutcome::NoData { .. } => {
            format!(r#"<div class="warning">{}</div>"#, NO_DATA_WARNING)
        }
        RiskOutcome::Series(r) => {
            let range = r.range.unwrap_or(r.bounds);
            format!(
                r#"{controls}
        <h2>Cancellation Risk vs. Lead Time</h2>
        <p class="meta">{rows} bookings, {points} lead-time values shown</p>
        {chart}"#,
                controls = render_range_controls(r.bounds, range),
                rows = r.rows,
                points = r.series.len(),
                chart = render_chart_svg(&r.series),
            )
        }
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Hotel Cancellation Risk Predictor</title>
    <style>{css}</style>
</head>
<body>
    <div class="container">
        <h1>Hotel Cancellation Risk Predictor</h1>
        <form method="get" action="/">
        {select}
        {error}
        {body}
        </form>
    </div>
</body>
</html>"#,
        css = inline_css(),
        select = render_hotel_select(view.hotels, view.selected),
        error = view
            .error
            .map(|e| format!(r#"<div class="error">{}</div>"#, escape_html(e)))
            .unwrap_or_default(),
        body = body,
    )
}

fn render_hotel_select(hotels: &[String], selected: &str) -> String {
    let mut options = String::new();
    for h in hotels {
        let sel = if h == selected { " selected" } else { "" };
        let h = escape_html(h);
        let _ = write!(options, r#"<option value="{h}"{sel}>{h}</option>"#);
    }
    // 换酒店时清掉上一个酒店的范围
    format!(
        r#"<label>Select a Hotel
            <select name="hotel" onchange="this.form.min.value='';this.form.max.value='';this.form.submit()">{options}</select>
        </label>"#
    )
}

fn render_range_controls(bounds: LeadTimeRange, range: LeadTimeRange) -> String {
    format!(
        r#"<fieldset>
            <legend>Select Lead Time Range (in Days)</legend>
            <input type="number" name="min" min="{lo}" max="{hi}" value="{min}">
            <input type="number" name="max" min="{lo}" max="{hi}" value="{max}">
            <button type="submit">Apply</button>
        </fieldset>"#,
        lo = bounds.min,
        hi = bounds.max,
        min = range.min,
        max = range.max,
    )
}

/// 折线图：x = lead_time（天），y = 预测取消概率均值，固定 [0, 1]
pub fn render_chart_svg(series: &RiskSeries) -> String {
    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    // 单点或空序列时把 x 轴撑开一点
    let (x_lo, x_hi) = match series.bounds() {
        Some(b) if b.min < b.max => (b.min as f64, b.max as f64),
        Some(b) => (b.min as f64 - 1.0, b.max as f64 + 1.0),
        None => (0.0, 1.0),
    };
    let sx = |x: f64| MARGIN_LEFT + (x - x_lo) / (x_hi - x_lo) * plot_w;
    let sy = |y: f64| MARGIN_TOP + (1.0 - y) * plot_h;

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg class="chart" xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#
    );

    // y grid
    for i in 0..=4 {
        let v = i as f64 / 4.0;
        let y = sy(v);
        let _ = write!(
            svg,
            r##"<line class="grid" x1="{x1:.1}" y1="{y:.1}" x2="{x2:.1}" y2="{y:.1}"/><text x="{tx:.1}" y="{ty:.1}" text-anchor="end">{v:.2}</text>"##,
            x1 = MARGIN_LEFT,
            x2 = MARGIN_LEFT + plot_w,
            tx = MARGIN_LEFT - 8.0,
            ty = y + 4.0,
        );
    }

    // x ticks
    for t in x_ticks(x_lo, x_hi) {
        let x = sx(t as f64);
        let _ = write!(
            svg,
            r##"<line class="grid" x1="{x:.1}" y1="{y1:.1}" x2="{x:.1}" y2="{y2:.1}"/><text x="{x:.1}" y="{ty:.1}" text-anchor="middle">{t}</text>"##,
            y1 = MARGIN_TOP,
            y2 = MARGIN_TOP + plot_h,
            ty = MARGIN_TOP + plot_h + 18.0,
        );
    }

    // axes
    let _ = write!(
        svg,
        r#"<line class="axis" x1="{l:.1}" y1="{b:.1}" x2="{r:.1}" y2="{b:.1}"/><line class="axis" x1="{l:.1}" y1="{t:.1}" x2="{l:.1}" y2="{b:.1}"/>"#,
        l = MARGIN_LEFT,
        r = MARGIN_LEFT + plot_w,
        t = MARGIN_TOP,
        b = MARGIN_TOP + plot_h,
    );
    let _ = write!(
        svg,
        r#"<text x="{cx:.1}" y="{by:.1}" text-anchor="middle">Lead Time (Days)</text><text transform="translate(16 {cy:.1}) rotate(-90)" text-anchor="middle">Predicted Cancellation Risk</text>"#,
        cx = MARGIN_LEFT + plot_w / 2.0,
        by = HEIGHT - 10.0,
        cy = MARGIN_TOP + plot_h / 2.0,
    );

    if series.is_empty() {
        let _ = write!(
            svg,
            r#"<text class="empty" x="{cx:.1}" y="{cy:.1}" text-anchor="middle">No lead-time values in the selected range</text>"#,
            cx = MARGIN_LEFT + plot_w / 2.0,
            cy = MARGIN_TOP + plot_h / 2.0,
        );
    } else {
        let coords: Vec<(f64, f64)> = series
            .points()
            .iter()
            .map(|p| (sx(p.lead_time as f64), sy(p.risk)))
            .collect();
        let path = coords
            .iter()
            .map(|(x, y)| format!("{x:.1},{y:.1}"))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = write!(
            svg,
            r#"<polyline fill="none" stroke="{LINE_COLOR}" stroke-width="2" points="{path}"/>"#
        );
        for ((x, y), p) in coords.iter().zip(series.points()) {
            let _ = write!(
                svg,
                r#"<circle cx="{x:.1}" cy="{y:.1}" r="3" fill="{LINE_COLOR}"><title>{lt} days: {risk:.3}</title></circle>"#,
                lt = p.lead_time,
                risk = p.risk,
            );
        }
    }

    svg.push_str("</svg>");
    svg
}

/// 至多 6 个整数刻度，步长取 1/2/5 × 10^k
fn x_ticks(lo: f64, hi: f64) -> Vec<i64> {
    let span = (hi - lo).max(1.0);
    let raw = span / 5.0;
    let mag = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * mag)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * mag)
        .max(1.0)
        .round() as i64;
    let start = (lo / step as f64).ceil() as i64 * step;
    (0..)
        .map(|i| start + i * step)
        .take_while(|t| (*t as f64) <= hi)
        .collect()
}

fn inline_css() -> &'static str {
    r#"
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif; margin: 0; background: #f6f7f9; color: #222; }
.container { max-width: 800px; margin: 32px auto; background: #fff; padding: 24px 32px; border-radius: 8px; box-shadow: 0 1px 3px rgba(0,0,0,.08); }
h1 { font-size: 1.6em; margin-top: 0; }
h2 { font-size: 1.2em; margin-bottom: 4px; }
label, fieldset { display: block; margin: 12px 0; }
fieldset { border: 1px solid #ddd; border-radius: 6px; }
input[type=number] { width: 90px; }
.meta { color: #777; font-size: .9em; margin-top: 0; }
.error { background: #fdecea; border: 1px solid #e57373; padding: 12px; border-radius: 6px; margin-top: 16px; }
.warning { background: #fff4e5; border: 1px solid #ffb74d; padding: 12px; border-radius: 6px; margin-top: 16px; }
.chart text { font-size: 11px; fill: #555; }
.chart .grid { stroke: #e6e6e6; }
.chart .axis { stroke: #888; }
.chart .empty { font-size: 14px; fill: #999; }
"#
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
