use ratatui::prelude::*;
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Padding, Paragraph, Wrap};

use crate::app::{App, InnerTab, LeftView, Pane, ResponseMode, ScrollLimits};
use crate::hooks::LayoutOptions;
use crate::query_form::FormRow;
use crate::schema::Category;
use crate::theme::Theme;
use crate::widgets::{IDLE_NOTICE, Verdict};

const TEXT_PADDING: u16 = 1;
const STATUS_HEIGHT: u16 = 3;
const TITLE_BAR_HEIGHT: u16 = 3;
const TAB_BAR_HEIGHT: u16 = 2;
const RESPONSE_HEIGHT: u16 = 5;
const MAX_SUGGESTION_LINES: u16 = 4;
const ACTIVE_TITLE_BG: Color = Color::Rgb(90, 145, 200);
const ACTIVE_TITLE_FG: Color = Color::Black;
const USER_HELP_TEXT: &str =
    "Tab/Shift+Tab focus | Enter send | Up/Down scroll | Ctrl+O context | Ctrl+C quit";
const WIZARD_HELP_TEXT: &str = "Tab/Shift+Tab focus | Ctrl+Left/Right category | Ctrl+T tab | Ctrl+A add field | Del remove | Ctrl+S find example | Ctrl+O context | Ctrl+C quit";

#[derive(Debug, Clone, Copy)]
struct Areas {
    left_title: Rect,
    left_content: Rect,
    messages_title: Rect,
    messages: Rect,
    response: Rect,
    status: Rect,
}

fn areas(screen: Rect, app: &App, layout: &LayoutOptions) -> Areas {
    let [body, status] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(STATUS_HEIGHT)]).areas(screen);
    let [left, right] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(body);
    let [left_title, left_content] =
        Layout::vertical([Constraint::Length(TITLE_BAR_HEIGHT), Constraint::Min(0)]).areas(left);

    let message_constraint = match layout.message_pane_height {
        Some(height) => Constraint::Length(height),
        None => Constraint::Min(1),
    };
    let [messages_title, messages, response] = Layout::vertical([
        Constraint::Length(TITLE_BAR_HEIGHT),
        message_constraint,
        Constraint::Length(response_height(app)),
    ])
    .areas(right);

    Areas {
        left_title,
        left_content,
        messages_title,
        messages,
        response,
        status,
    }
}

fn response_height(app: &App) -> u16 {
    match app.response_mode() {
        ResponseMode::Text => {
            let suggestions = (app.suggestions().len() as u16).min(MAX_SUGGESTION_LINES);
            RESPONSE_HEIGHT + if suggestions > 0 { suggestions + 1 } else { 0 }
        }
        ResponseMode::Idle | ResponseMode::Evaluation => RESPONSE_HEIGHT,
    }
}

/// Scroll bounds for the chat list and the instruction pane at this screen size.
pub fn scroll_limits(screen: Rect, app: &App, layout: &LayoutOptions) -> ScrollLimits {
    let areas = areas(screen, app, layout);
    let chat_width = areas.messages.width.saturating_sub(TEXT_PADDING * 2).max(1);
    let chat_lines = message_lines(app, &Theme::default());
    let chat_total = wrapped_line_count(&chat_lines, chat_width);
    let chat_visible = areas.messages.height.saturating_sub(TEXT_PADDING * 2);

    let left_width = areas.left_content.width.saturating_sub(TEXT_PADDING * 2).max(1);
    let left_lines = left_text(app, &Theme::default()).lines;
    let left_total = wrapped_line_count(&left_lines, left_width);
    let left_visible = areas.left_content.height.saturating_sub(TEXT_PADDING * 2);

    ScrollLimits {
        chat: chat_total.saturating_sub(chat_visible),
        left: left_total.saturating_sub(left_visible),
    }
}

pub fn render(frame: &mut Frame, app: &App, theme: &Theme, layout: &LayoutOptions) {
    let areas = areas(frame.area(), app, layout);

    render_left_pane(frame, &areas, app, theme);
    render_title_bar(
        frame,
        areas.messages_title,
        "Conversation",
        theme.chat_bg,
        app.active_pane == Pane::Messages,
        theme,
    );
    frame.render_widget(
        Paragraph::new(Text::from(message_lines(app, theme)))
            .style(Style::default().bg(theme.chat_bg).fg(theme.text_fg))
            .wrap(Wrap { trim: false })
            .scroll((app.chat_scroll(), 0))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.chat_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        areas.messages,
    );
    render_response_area(frame, areas.response, app, theme);

    frame.render_widget(
        Paragraph::new(status_line_text(app))
            .style(Style::default().bg(theme.status_bg).fg(theme.muted_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.status_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        areas.status,
    );
}

fn render_title_bar(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    base: Color,
    active: bool,
    theme: &Theme,
) {
    let title_bg = title_bar_bg(base, active);
    let title_fg = if active {
        ACTIVE_TITLE_FG
    } else {
        theme.muted_fg
    };
    frame.render_widget(
        Paragraph::new(title.to_string())
            .style(Style::default().bg(title_bg).fg(title_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(title_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        area,
    );
}

fn left_title(app: &App) -> &'static str {
    match app.left_view() {
        LeftView::Context => "Task Context",
        LeftView::Task if app.shows_search_tabs() => "Search",
        LeftView::Task => "Task Instructions",
    }
}

fn render_left_pane(frame: &mut Frame, areas: &Areas, app: &App, theme: &Theme) {
    let active = app.active_pane == Pane::Left;
    let bg = if app.shows_search_tabs() {
        theme.form_bg
    } else {
        theme.instructions_bg
    };
    render_title_bar(frame, areas.left_title, left_title(app), bg, active, theme);

    let mut content = areas.left_content;
    if app.shows_search_tabs() && app.left_view() == LeftView::Task {
        let [tabs_area, rest] =
            Layout::vertical([Constraint::Length(TAB_BAR_HEIGHT), Constraint::Min(0)])
                .areas(content);
        frame.render_widget(
            Paragraph::new(Text::from(tab_lines(app, theme)))
                .style(Style::default().bg(bg).fg(theme.muted_fg))
                .block(Block::default().padding(Padding::horizontal(TEXT_PADDING))),
            tabs_area,
        );
        content = rest;
    }

    let scroll = if app.shows_search_tabs()
        && app.left_view() == LeftView::Task
        && app.inner_tab() == InnerTab::KnowledgeBase
    {
        form_scroll(app, content.height.saturating_sub(TEXT_PADDING * 2))
    } else {
        app.left_scroll()
    };
    frame.render_widget(
        Paragraph::new(left_text(app, theme))
            .style(Style::default().bg(bg).fg(theme.text_fg))
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0))
            .block(
                Block::default()
                    .style(Style::default().bg(bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        content,
    );
}

/// Keeps the selected form row on screen.
fn form_scroll(app: &App, visible: u16) -> u16 {
    let selected = app.form_cursor() as u16;
    selected.saturating_sub(visible.saturating_sub(1))
}

fn tab_lines(app: &App, theme: &Theme) -> Vec<Line<'static>> {
    let tab_style = |selected: bool| {
        if selected {
            Style::default()
                .fg(theme.active_fg)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(theme.muted_fg)
        }
    };
    let categories = Category::ALL
        .into_iter()
        .flat_map(|category| {
            [
                Span::styled(category.label(), tab_style(category == app.category())),
                Span::raw("  "),
            ]
        })
        .collect::<Vec<_>>();
    let inner = [InnerTab::InstructionSchema, InnerTab::KnowledgeBase]
        .into_iter()
        .flat_map(|tab| {
            [
                Span::styled(tab.label(), tab_style(tab == app.inner_tab())),
                Span::raw("  "),
            ]
        })
        .collect::<Vec<_>>();
    vec![Line::from(categories), Line::from(inner)]
}

fn left_text(app: &App, theme: &Theme) -> Text<'static> {
    match app.left_view() {
        LeftView::Context => context_text(app, theme),
        LeftView::Task if !app.shows_search_tabs() => instructions_text(app, theme),
        LeftView::Task => match app.inner_tab() {
            InnerTab::InstructionSchema => Text::from(
                app.schema_lines()
                    .into_iter()
                    .map(Line::from)
                    .collect::<Vec<_>>(),
            ),
            InnerTab::KnowledgeBase => form_text(app, theme),
        },
    }
}

fn heading(text: &str, theme: &Theme) -> Line<'static> {
    Line::styled(
        text.to_string(),
        Style::default()
            .fg(theme.active_fg)
            .add_modifier(Modifier::BOLD),
    )
}

fn instructions_text(app: &App, theme: &Theme) -> Text<'static> {
    let instructions = app.instructions();
    let mut lines = markdown_lines(&instructions.task_description);
    if !instructions.completion_requirements.is_empty() {
        lines.push(Line::default());
        lines.push(heading("Complete the task when:", theme));
        lines.extend(
            instructions
                .completion_requirements
                .iter()
                .map(|requirement| Line::from(format!("  • {requirement}"))),
        );
    }
    if !instructions.completion_questions.is_empty() {
        lines.push(Line::default());
        lines.push(heading("You will be asked:", theme));
        lines.extend(
            instructions
                .completion_questions
                .iter()
                .map(|question| Line::from(format!("  • {question}"))),
        );
    }
    if app.is_onboarding() && !instructions.accept_prompt.is_empty() {
        lines.push(Line::default());
        lines.push(Line::styled(
            instructions.accept_prompt.clone(),
            Style::default().fg(theme.muted_fg),
        ));
    }
    Text::from(lines)
}

fn context_text(app: &App, theme: &Theme) -> Text<'static> {
    if app.context().is_empty() && app.kb_items().is_empty() {
        return Text::from(Line::styled(
            "No context received yet.",
            Style::default().fg(theme.muted_fg),
        ));
    }
    let mut lines = app
        .context()
        .iter()
        .flat_map(|entry| [Line::from(entry.clone()), Line::default()])
        .collect::<Vec<_>>();
    if !app.kb_items().is_empty() {
        lines.push(heading("Knowledge base items:", theme));
        lines.extend(
            app.kb_items()
                .iter()
                .map(|item| Line::from(format!("  {item}"))),
        );
    }
    Text::from(lines)
}

fn form_text(app: &App, theme: &Theme) -> Text<'static> {
    let focused = app.active_pane == Pane::Left;
    let schema = app.schema();
    let rows = app.form().rows(schema, app.category());
    let mut lines = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| form_row_line(row, focused && idx == app.form_cursor(), theme))
        .collect::<Vec<_>>();

    let picked = app
        .form()
        .picked_field(schema, app.category())
        .unwrap_or("-");
    let picker_selected = focused && app.is_picker_row_selected();
    lines.push(Line::from(vec![
        Span::raw(if picker_selected { "> " } else { "  " }),
        Span::styled(
            format!("+ Add field: < {picked} >"),
            selection_style(picker_selected, theme),
        ),
    ]));
    lines.push(Line::default());

    let button_style = if app.find_example_enabled() {
        Style::default()
            .fg(theme.active_fg)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme.muted_fg)
    };
    lines.push(Line::styled("[ Find example ] (Ctrl+S)", button_style));
    if let Some(query) = app.last_query() {
        lines.push(Line::styled(
            format!("Last query: {query}"),
            Style::default().fg(theme.muted_fg),
        ));
    }
    Text::from(lines)
}

fn selection_style(selected: bool, theme: &Theme) -> Style {
    if selected {
        Style::default()
            .fg(theme.active_fg)
            .add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    }
}

fn form_row_line(row: &FormRow<'_>, selected: bool, theme: &Theme) -> Line<'static> {
    let marker = Span::raw(if selected { "> " } else { "  " });
    let control = match &row.control {
        Ok(control) => control,
        Err(err) => {
            return Line::from(vec![
                marker,
                Span::styled(err.to_string(), Style::default().fg(theme.warning_fg)),
            ]);
        }
    };
    let mut label = control.field_name.clone();
    if control.required {
        label.push('*');
    }
    let value = row.input.map(|input| input.display_value()).unwrap_or_default();
    let mut spans = vec![
        marker,
        Span::styled(format!("{label}: "), Style::default().fg(theme.muted_fg)),
        Span::styled(value, selection_style(selected, theme)),
    ];
    if let (Some(condition), false) = (&control.enabled_when, row.enabled) {
        spans.push(Span::styled(
            format!("  ({condition})"),
            Style::default().fg(theme.warning_fg),
        ));
    }
    Line::from(spans)
}

fn message_lines(app: &App, theme: &Theme) -> Vec<Line<'static>> {
    if app.messages().is_empty() {
        return vec![Line::styled(
            "No messages yet.",
            Style::default().fg(theme.muted_fg),
        )];
    }
    app.messages()
        .iter()
        .map(|message| {
            Line::from(vec![
                Span::styled(
                    format!("{}: ", message.speaker),
                    Style::default()
                        .fg(theme.speaker_fg(&message.speaker))
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(message.text.clone()),
            ])
        })
        .collect()
}

fn render_response_area(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let active = app.active_pane == Pane::Response;
    let block = Block::default()
        .style(Style::default().bg(theme.input_bg))
        .padding(Padding::uniform(TEXT_PADDING));
    match app.response_mode() {
        ResponseMode::Idle => {
            frame.render_widget(
                Paragraph::new(IDLE_NOTICE)
                    .style(Style::default().bg(theme.input_bg).fg(theme.muted_fg))
                    .wrap(Wrap { trim: true })
                    .block(block),
                area,
            );
        }
        ResponseMode::Evaluation => {
            let evaluation = app.evaluation();
            let enabled = evaluation.buttons_enabled(app.evaluation_active());
            let button = |verdict: Verdict| {
                let style = if !enabled {
                    Style::default().fg(theme.muted_fg)
                } else if verdict == evaluation.selected() {
                    Style::default()
                        .fg(theme.active_fg)
                        .add_modifier(Modifier::REVERSED | Modifier::BOLD)
                } else {
                    Style::default().fg(theme.text_fg)
                };
                Span::styled(format!("[ {} ]", verdict.label()), style)
            };
            let mut lines = vec![Line::from(vec![
                button(Verdict::Reject),
                Span::raw("   "),
                button(Verdict::Approve),
            ])];
            if evaluation.is_sending() {
                lines.push(Line::styled("Sending...", Style::default().fg(theme.muted_fg)));
            }
            frame.render_widget(
                Paragraph::new(Text::from(lines))
                    .style(Style::default().bg(theme.input_bg))
                    .block(block),
                area,
            );
        }
        ResponseMode::Text => render_text_response(frame, area, app, active, theme),
    }
}

fn render_text_response(frame: &mut Frame, area: Rect, app: &App, active: bool, theme: &Theme) {
    let response = app.text_response();
    let enabled = response.is_input_enabled(app.text_active());
    let mut lines = Vec::new();
    if !app.suggestions().is_empty() {
        lines.push(Line::styled(
            "Suggestions (Up/Down to use):",
            Style::default().fg(theme.muted_fg),
        ));
        lines.extend(
            app.suggestions()
                .iter()
                .take(MAX_SUGGESTION_LINES as usize)
                .enumerate()
                .map(|(idx, suggestion)| {
                    let selected = app.selected_suggestion() == Some(idx);
                    Line::styled(
                        format!("  {suggestion}"),
                        selection_style(selected, theme),
                    )
                }),
        );
    }
    let prompt = if response.is_sending() {
        "Sending... "
    } else if !enabled {
        "(waiting) "
    } else {
        "> "
    };
    let input_row = lines.len() as u16;
    lines.push(Line::from(vec![
        Span::styled(prompt, Style::default().fg(theme.muted_fg)),
        Span::styled(
            response.value().to_string(),
            Style::default().fg(if enabled { theme.text_fg } else { theme.muted_fg }),
        ),
    ]));
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().bg(theme.input_bg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.input_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        area,
    );

    if active && enabled {
        let column = prompt.chars().count().saturating_add(response.cursor());
        if let Some(position) = input_cursor_position(area, column, input_row) {
            frame.set_cursor_position(position);
        }
    }
}

/// Terminal cell for the input cursor, or `None` when it falls outside `area`.
fn input_cursor_position(area: Rect, column: usize, row: u16) -> Option<(u16, u16)> {
    let column = u16::try_from(column).unwrap_or(u16::MAX);
    let x = area.x.saturating_add(TEXT_PADDING).saturating_add(column);
    let y = area.y.saturating_add(TEXT_PADDING).saturating_add(row);
    (x < area.right() && y < area.bottom()).then_some((x, y))
}

fn status_line_text(app: &App) -> String {
    let help = if app.shows_search_tabs() {
        WIZARD_HELP_TEXT
    } else {
        USER_HELP_TEXT
    };
    format!("{} | {} | {}", app.agent_id(), app.chat_state().label(), help)
}

/// Renders task markdown and re-homes the styled spans onto this crate's
/// ratatui types.
fn markdown_lines(source: &str) -> Vec<Line<'static>> {
    tui_markdown::from_str(source)
        .lines
        .iter()
        .map(|line| {
            Line::from(
                line.spans
                    .iter()
                    .map(|span| Span::styled(span.content.to_string(), convert_style(span.style)))
                    .collect::<Vec<_>>(),
            )
            .style(convert_style(line.style))
        })
        .collect()
}

fn convert_style(style: ratatui_core::style::Style) -> Style {
    let mut converted = Style::default()
        .add_modifier(Modifier::from_bits_truncate(style.add_modifier.bits()))
        .remove_modifier(Modifier::from_bits_truncate(style.sub_modifier.bits()));
    if let Some(fg) = style.fg.and_then(convert_color) {
        converted = converted.fg(fg);
    }
    if let Some(bg) = style.bg.and_then(convert_color) {
        converted = converted.bg(bg);
    }
    converted
}

fn convert_color(color: ratatui_core::style::Color) -> Option<Color> {
    color.to_string().parse().ok()
}

fn wrapped_line_count(lines: &[Line<'_>], width: u16) -> u16 {
    let width = usize::from(width.max(1));
    lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(width))
        .sum::<usize>()
        .min(usize::from(u16::MAX)) as u16
}

fn title_bar_bg(base: Color, active: bool) -> Color {
    if active {
        return ACTIVE_TITLE_BG;
    }
    match base {
        Color::Rgb(r, g, b) => {
            let delta = -12;
            Color::Rgb(
                adjust_channel(r, delta),
                adjust_channel(g, delta),
                adjust_channel(b, delta),
            )
        }
        _ => base,
    }
}

fn adjust_channel(channel: u8, delta: i16) -> u8 {
    let value = channel as i16 + delta;
    value.clamp(0, 255) as u8
}

#[cfg(test)]
#[path = "../tests/unit/ui_tests.rs"]
mod tests;
