use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph, Wrap},
};

use crate::app::{App, InputMode, Screen, WorkspacePane};
use crate::chat::{parse_message, ChatRole};
use crate::download::DownloadProgress;
use crate::lifecycle::InstallPhase;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current_text = String::new();

    while let Some((_, c)) = chars.next() {
        if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
            // Consume the second *
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some((_, c)) = chars.next() {
                if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Rows a set of lines occupies after wrapping to the given width.
/// The transcript scroll maths needs this before the widget renders, and
/// it has to match the word wrapping the Wrap widget performs.
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    if width == 0 {
        return 0;
    }
    let width = width as usize;
    let mut rows: usize = 0;
    for line in lines {
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        rows += rows_for_line(&text, width);
    }
    rows.min(u16::MAX as usize) as u16
}

/// Greedy word wrap: words fill a row until the next one (plus a space)
/// would overflow; a word longer than the row breaks mid-word.
fn rows_for_line(text: &str, width: usize) -> usize {
    let mut rows = 0;
    let mut current = 0;
    for word in text.split_whitespace() {
        let mut len = word.chars().count();
        if current > 0 {
            if current + 1 + len <= width {
                current += 1 + len;
                continue;
            }
            rows += 1;
            current = 0;
        }
        while len > width {
            rows += 1;
            len -= width;
        }
        current = len;
    }
    // A blank line still occupies a row
    if current > 0 || rows == 0 {
        rows + 1
    } else {
        rows
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, status, footer
    let [header_area, body_area, status_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Hub => render_hub_screen(app, frame, body_area),
        Screen::Detail => render_detail_screen(app, frame, body_area),
        Screen::Workspace => render_workspace_screen(app, frame, body_area),
        Screen::Chat => render_chat_screen(app, frame, body_area),
    }

    render_status(app, frame, status_area);
    render_footer(app, frame, footer_area);

    if app.confirm_uninstall && app.screen == Screen::Workspace {
        render_confirm_uninstall(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let installed = app.installed_ids.len();
    let installed_indicator = if installed > 0 {
        format!(" [{} installed]", installed)
    } else {
        String::new()
    };

    let title = Line::from(vec![
        Span::styled(" Agent Hub ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(installed_indicator, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let line = if let Some(status) = &app.status {
        Line::from(Span::styled(
            format!(" {} ", status),
            Style::default().fg(Color::Yellow),
        ))
    } else {
        let platform = app
            .platform
            .map(|p| p.label())
            .unwrap_or("unsupported platform");
        Line::from(Span::styled(
            format!(" {} ", platform),
            Style::default().fg(Color::DarkGray),
        ))
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::Hub => " HUB ",
        Screen::Detail => " AGENT ",
        Screen::Workspace => " WORKSPACE ",
        Screen::Chat => " CHAT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match (app.screen, app.input_mode) {
        (Screen::Hub, InputMode::Normal) => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" nav ", label_style),
            Span::styled(" Enter ", key_style),
            Span::styled(" open ", label_style),
            Span::styled(" / ", key_style),
            Span::styled(" search ", label_style),
            Span::styled(" Tab ", key_style),
            Span::styled(" category ", label_style),
            Span::styled(" w ", key_style),
            Span::styled(" workspace ", label_style),
            Span::styled(" c ", key_style),
            Span::styled(" chat ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        (Screen::Hub, InputMode::Editing) => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" done ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" cancel ", label_style),
        ],
        (Screen::Detail, InputMode::Normal) => {
            let mut hints = vec![];
            match app.install_phase {
                InstallPhase::Idle => {
                    let installable = app
                        .detail_agent()
                        .map(|a| a.installable_on(app.platform))
                        .unwrap_or(false);
                    if installable {
                        hints.extend(vec![
                            Span::styled(" i ", key_style),
                            Span::styled(" install ", label_style),
                        ]);
                    }
                }
                InstallPhase::Installed => {
                    hints.extend(vec![
                        Span::styled(" u ", key_style),
                        Span::styled(" uninstall ", label_style),
                    ]);
                }
                InstallPhase::Installing | InstallPhase::Uninstalling => {}
            }
            hints.extend(vec![
                Span::styled(" c ", key_style),
                Span::styled(" chat ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" back ", label_style),
            ]);
            hints
        }
        (Screen::Workspace, InputMode::Normal) => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" nav ", label_style),
            Span::styled(" Tab ", key_style),
            Span::styled(" focus ", label_style),
            Span::styled(" s ", key_style),
            Span::styled(" setup ", label_style),
            Span::styled(" a ", key_style),
            Span::styled(" agent ", label_style),
            Span::styled(" r ", key_style),
            Span::styled(" run ", label_style),
            Span::styled(" R ", key_style),
            Span::styled(" refresh ", label_style),
            Span::styled(" Enter ", key_style),
            Span::styled(" edit ", label_style),
            Span::styled(" D ", key_style),
            Span::styled(" default ", label_style),
            Span::styled(" u ", key_style),
            Span::styled(" uninstall ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" back ", label_style),
        ],
        (Screen::Workspace, InputMode::Editing) => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" save ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" cancel ", label_style),
        ],
        (Screen::Chat, InputMode::Normal) => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" G ", key_style),
            Span::styled(" bottom ", label_style),
            Span::styled(" i ", key_style),
            Span::styled(" type ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" back ", label_style),
        ],
        // The detail screen never enters editing mode (see handler.rs)
        (Screen::Detail, InputMode::Editing) => vec![],
        (Screen::Chat, InputMode::Editing) => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" stop typing ", label_style),
        ],
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_hub_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [input_area, results_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(area);

    // Search input, titled with the active category filter
    let category_label = app
        .current_category()
        .map(|c| format!(" Search [{}] ", c))
        .unwrap_or_else(|| " Search [all] ".to_string());

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.input_mode == InputMode::Editing {
            Color::Yellow
        } else {
            Color::DarkGray
        }))
        .title(category_label);

    let input = Paragraph::new(app.search_input.as_str())
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, input_area);

    if app.input_mode == InputMode::Editing {
        frame.set_cursor_position((
            input_area.x + app.search_input.chars().count() as u16 + 1,
            input_area.y + 1,
        ));
    }

    // Agent list on the left, preview on the right
    let [list_area, preview_area] = Layout::horizontal([
        Constraint::Percentage(40),
        Constraint::Percentage(60),
    ])
    .areas(results_area);

    // Store areas for mouse hit-testing
    app.list_area = Some(list_area);
    app.content_area = Some(preview_area);

    let list_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" Agents ({}) ", app.filtered.len()));

    let items: Vec<ListItem> = app
        .filtered
        .iter()
        .filter_map(|&idx| app.catalog.agents().get(idx))
        .map(|agent| {
            let marker = if app.store.is_installed(&agent.id) {
                Span::styled("* ", Style::default().fg(Color::Green))
            } else {
                Span::raw("  ")
            };
            ListItem::new(Line::from(vec![
                marker,
                Span::raw(agent.name.clone()),
                Span::styled(
                    format!("  {}", agent.author),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(list_block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, list_area, &mut app.hub_state);

    // Preview panel
    let preview_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Preview ");

    let preview_text = if let Some(agent) = app.selected_hub_agent() {
        let mut lines = vec![
            Line::from(Span::styled(
                agent.name.clone(),
                Style::default().fg(Color::Yellow).bold(),
            )),
            Line::from(Span::styled(
                format!("by {}", agent.author),
                Style::default().fg(Color::DarkGray),
            )),
            Line::default(),
        ];
        for desc_line in agent.description.lines() {
            lines.push(parse_markdown_line(desc_line));
        }
        if let Some(category) = &agent.category {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                format!("category: {}", category),
                Style::default().fg(Color::Magenta),
            )));
        }
        Text::from(lines)
    } else {
        Text::from(Span::styled(
            "No agents match",
            Style::default().fg(Color::DarkGray),
        ))
    };

    let preview = Paragraph::new(preview_text)
        .block(preview_block)
        .wrap(Wrap { trim: true });

    frame.render_widget(preview, preview_area);
}

fn render_detail_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    app.list_area = None;
    app.content_area = Some(area);

    let Some(agent) = app.detail_agent().cloned() else {
        let placeholder = Paragraph::new("No agent selected")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(placeholder, area);
        return;
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" {} ", agent.name));

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Author: ", Style::default().fg(Color::DarkGray)),
            Span::raw(agent.author.clone()),
        ]),
    ];
    if let Some(category) = &agent.category {
        lines.push(Line::from(vec![
            Span::styled("Category: ", Style::default().fg(Color::DarkGray)),
            Span::raw(category.clone()),
        ]));
    }
    lines.push(Line::default());
    for desc_line in agent.description.lines() {
        lines.push(parse_markdown_line(desc_line));
    }
    lines.push(Line::default());

    lines.push(Line::from(Span::styled(
        "Builds",
        Style::default().fg(Color::Yellow).bold(),
    )));
    if agent.builds.is_empty() {
        lines.push(Line::from(Span::styled(
            "  none published",
            Style::default().fg(Color::DarkGray),
        )));
    }
    for build in &agent.builds {
        let matches_host = app.platform == Some(build.platform);
        let marker = if matches_host { "> " } else { "  " };
        let style = if matches_host {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let mut spans = vec![Span::styled(
            format!("{}{}", marker, build.platform.label()),
            style,
        )];
        if let Some(desc) = &build.description {
            spans.push(Span::styled(
                format!("  {}", desc),
                Style::default().fg(Color::DarkGray),
            ));
        }
        lines.push(Line::from(spans));
    }
    lines.push(Line::default());

    match app.install_phase {
        InstallPhase::Idle => {
            if agent.installable_on(app.platform) {
                lines.push(Line::from(Span::styled(
                    "Press 'i' to install",
                    Style::default().fg(Color::Cyan),
                )));
            } else {
                lines.push(Line::from(Span::styled(
                    "No build available for this platform",
                    Style::default().fg(Color::DarkGray),
                )));
            }
        }
        InstallPhase::Installing => {
            // The gauge below shows transfer progress
            lines.push(Line::from(Span::styled(
                "Installing...",
                Style::default().fg(Color::Yellow),
            )));
        }
        InstallPhase::Installed => {
            lines.push(Line::from(Span::styled(
                "Installed",
                Style::default().fg(Color::Green).bold(),
            )));
        }
        InstallPhase::Uninstalling => {
            lines.push(Line::from(Span::styled(
                "Uninstalling...",
                Style::default().fg(Color::Yellow),
            )));
        }
    }

    let inner = block.inner(area);
    frame.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: true }), area);

    if app.install_phase == InstallPhase::Installing {
        if let Some(progress) = app.download_progress {
            render_download_gauge(progress, frame, inner);
        }
    }
}

fn render_download_gauge(progress: DownloadProgress, frame: &mut Frame, inner: Rect) {
    if inner.height < 2 {
        return;
    }
    let gauge_area = Rect::new(
        inner.x,
        inner.y + inner.height - 1,
        inner.width,
        1,
    );

    let label = if progress.total > 0 {
        format!(
            "{} / {} ({}%)",
            human_bytes(progress.downloaded),
            human_bytes(progress.total),
            progress.percentage,
        )
    } else {
        format!("{} downloaded", human_bytes(progress.downloaded))
    };

    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Cyan).bg(Color::DarkGray))
        .percent(progress.percentage as u16)
        .label(label);

    frame.render_widget(gauge, gauge_area);
}

fn render_workspace_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [list_area, content_area] = Layout::horizontal([
        Constraint::Length(30),
        Constraint::Min(0),
    ])
    .areas(area);

    app.list_area = Some(list_area);
    app.content_area = Some(content_area);

    // Installed agents sidebar
    let agents_focused = app.workspace_focus == WorkspacePane::Agents;
    let sidebar_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if agents_focused {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title(format!(" Installed ({}) ", app.installed_ids.len()));

    if app.installed_ids.is_empty() {
        let placeholder = Paragraph::new("Nothing installed yet.\nInstall an agent from the hub.")
            .style(Style::default().fg(Color::DarkGray))
            .block(sidebar_block);
        frame.render_widget(placeholder, list_area);
    } else {
        let items: Vec<ListItem> = app
            .installed_ids
            .iter()
            .map(|id| {
                let name = app
                    .catalog
                    .get(id)
                    .map(|a| a.name.clone())
                    .unwrap_or_else(|| id.clone());
                let configured = app.store.state(id).configured;
                let mut spans = vec![Span::raw(format!(" {} ", name))];
                if !configured {
                    spans.push(Span::styled(
                        "(Action Required)",
                        Style::default().fg(Color::Yellow),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let list = List::new(items)
            .block(sidebar_block)
            .highlight_style(
                Style::default()
                    .bg(Color::Blue)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");

        frame.render_stateful_widget(list, list_area, &mut app.installed_state);
    }

    // Right side: actions on top, configuration below
    let [actions_area, config_area] = Layout::vertical([
        Constraint::Length(8),
        Constraint::Min(0),
    ])
    .areas(content_area);

    render_workspace_actions(app, frame, actions_area);
    render_workspace_config(app, frame, config_area);
}

fn render_workspace_actions(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Actions ");

    let Some(agent) = app.workspace_agent() else {
        let placeholder = Paragraph::new("Select an installed agent")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    };

    let configured = app.store.state(&agent.id).configured;
    let is_default = app.config.default_agent.as_deref() == Some(agent.id.as_str());

    let mut lines = vec![Line::from(vec![
        Span::styled(agent.name.clone(), Style::default().fg(Color::Yellow).bold()),
        if is_default {
            Span::styled("  [default]", Style::default().fg(Color::Green))
        } else {
            Span::raw("")
        },
    ])];
    lines.push(Line::default());

    for (key, hint) in [("setup", "s"), ("agent", "a"), ("run", "r")] {
        if !agent.commands.contains_key(key) {
            continue;
        }
        let running = app.executing.as_deref() == Some(key);
        let mut spans = vec![
            Span::styled(format!(" {} ", hint), Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(format!(" {} ", key)),
        ];
        if running {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            spans.push(Span::styled(
                format!("running{}", dots),
                Style::default().fg(Color::Yellow),
            ));
        } else if key == "setup" && !configured {
            spans.push(Span::styled(
                "(Action Required)",
                Style::default().fg(Color::Yellow).bold(),
            ));
        }
        lines.push(Line::from(spans));
    }

    if agent.data_endpoint.is_some() {
        let mut spans = vec![
            Span::styled(" R ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(" refresh data "),
        ];
        if app.refresh_task.is_some() {
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            spans.push(Span::styled(
                format!("fetching{}", dots),
                Style::default().fg(Color::Yellow),
            ));
        }
        lines.push(Line::from(spans));
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_workspace_config(app: &mut App, frame: &mut Frame, area: Rect) {
    let config_focused = app.workspace_focus == WorkspacePane::Config;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if config_focused {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title(" Configuration ");

    if app.config_fields.is_empty() {
        let placeholder = Paragraph::new("No editable configuration")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let editing = app.editing_field;
    let items: Vec<ListItem> = app
        .config_fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let value: Span = if editing == Some(i) {
                Span::styled(
                    app.field_input.clone(),
                    Style::default().fg(Color::Black).bg(Color::Yellow),
                )
            } else {
                Span::styled(field.value.clone(), Style::default().fg(Color::Cyan))
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!(" {}: ", field.key),
                    Style::default().fg(Color::White),
                ),
                value,
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.config_state);
}

fn render_confirm_uninstall(app: &App, frame: &mut Frame, area: Rect) {
    let name = app
        .workspace_agent()
        .map(|a| a.name.clone())
        .unwrap_or_else(|| "this agent".to_string());

    let popup_width = 50.min(area.width.saturating_sub(4));
    let popup_height = 5;
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Uninstall ");

    let text = Text::from(vec![
        Line::from(format!("Uninstall {}?", name)),
        Line::default(),
        Line::from(Span::styled(
            "y/Enter: confirm    any other key: cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ]);

    let prompt = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(prompt, popup_area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [transcript_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    app.list_area = None;
    app.content_area = Some(transcript_area);

    let title = app
        .chat_agent()
        .map(|a| format!(" Chat: {} ", a.name))
        .unwrap_or_else(|| " Chat ".to_string());

    let transcript_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);

    let inner = transcript_block.inner(transcript_area);
    app.chat_area_width = inner.width;
    app.chat_area_height = inner.height;

    let lines = build_transcript_lines(app);

    // The scroll policy works in wrapped rows, so count them before render
    let total = wrapped_height(&lines, inner.width);
    app.chat_scroll.set_extents(total, inner.height);

    let transcript = if lines.is_empty() {
        Paragraph::new(Span::styled(
            "Say something to the agent...",
            Style::default().fg(Color::DarkGray),
        ))
        .block(transcript_block)
    } else {
        Paragraph::new(lines)
            .block(transcript_block)
            .wrap(Wrap { trim: true })
            .scroll((app.chat_scroll.offset, 0))
    };

    frame.render_widget(transcript, transcript_area);

    // Input at the bottom
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.input_mode == InputMode::Editing {
            Color::Yellow
        } else {
            Color::DarkGray
        }))
        .title(" Message ");

    // Horizontal scroll keeps the cursor visible in a long input
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.chat_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .chat_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, input_area);

    if app.input_mode == InputMode::Editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}

fn build_transcript_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = Vec::new();

    for msg in &app.chat.messages {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.text.lines() {
                    lines.push(Line::from(line.to_string()));
                }
                lines.push(Line::default());
            }
            ChatRole::Assistant => {
                let parsed = parse_message(&msg.text);
                lines.push(Line::from(Span::styled(
                    "Agent:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                if let Some(tool) = &parsed.tool_id {
                    lines.push(Line::from(Span::styled(
                        format!("[used {}]", tool),
                        Style::default().fg(Color::Magenta).add_modifier(Modifier::ITALIC),
                    )));
                }
                for line in parsed.display_text.lines() {
                    lines.push(parse_markdown_line(line));
                }
                lines.push(Line::default());
            }
        }
    }

    // Live streaming buffer renders below the finalized history
    if let Some(streaming) = &app.chat.streaming {
        lines.push(Line::from(Span::styled(
            "Agent:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        for line in streaming.lines() {
            lines.push(Line::from(line.to_string()));
        }
    } else if app.chat.show_thinking() {
        lines.push(Line::from(Span::styled(
            "Agent:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}
