use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, InputMode, Screen, WorkspacePane};
use crate::lifecycle::InstallPhase;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string edits
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.on_tick().await;
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Works in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match app.screen {
        Screen::Hub => handle_hub_normal(app, key),
        Screen::Detail => handle_detail_normal(app, key),
        Screen::Workspace => handle_workspace_normal(app, key),
        Screen::Chat => handle_chat_normal(app, key),
    }
}

fn handle_hub_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('j') | KeyCode::Down => app.hub_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.hub_nav_up(),

        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
            if let Some(agent) = app.selected_hub_agent() {
                let id = agent.id.clone();
                app.open_detail(id);
            }
        }

        // Search
        KeyCode::Char('/') => {
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Esc => {
            if !app.search_input.is_empty() {
                app.search_input.clear();
                app.refresh_filter();
            }
        }

        // Category tabs
        KeyCode::Tab => app.cycle_category(),

        // Screen switching
        KeyCode::Char('w') => app.open_workspace(None),
        KeyCode::Char('c') => app.open_chat(None),

        _ => {}
    }
}

fn handle_detail_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Esc | KeyCode::Char('h') | KeyCode::Left | KeyCode::Backspace => {
            app.screen = Screen::Hub;
        }

        // Install / uninstall toggle for the shown agent
        KeyCode::Char('i') | KeyCode::Enter => match app.install_phase {
            InstallPhase::Idle => app.start_install(),
            InstallPhase::Installed => {
                if let Some(id) = app.detail_id.clone() {
                    app.uninstall(&id);
                }
            }
            // A transition is already in flight
            InstallPhase::Installing | InstallPhase::Uninstalling => {}
        },

        KeyCode::Char('w') => app.open_workspace(None),
        KeyCode::Char('c') => {
            let id = app.detail_id.clone();
            app.open_chat(id);
        }

        _ => {}
    }
}

fn handle_workspace_normal(app: &mut App, key: KeyEvent) {
    // Uninstall confirmation swallows everything except its own answer
    if app.confirm_uninstall {
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => {
                if let Some(id) = app.workspace_id.clone() {
                    app.uninstall(&id);
                }
            }
            _ => app.confirm_uninstall = false,
        }
        return;
    }

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Esc | KeyCode::Char('h') | KeyCode::Left => {
            app.screen = Screen::Hub;
        }

        KeyCode::Char('j') | KeyCode::Down => match app.workspace_focus {
            WorkspacePane::Agents => app.workspace_nav(true),
            WorkspacePane::Config => app.config_nav(true),
        },
        KeyCode::Char('k') | KeyCode::Up => match app.workspace_focus {
            WorkspacePane::Agents => app.workspace_nav(false),
            WorkspacePane::Config => app.config_nav(false),
        },

        KeyCode::Tab => {
            app.workspace_focus = match app.workspace_focus {
                WorkspacePane::Agents => WorkspacePane::Config,
                WorkspacePane::Config => WorkspacePane::Agents,
            };
        }

        // Manifest actions
        KeyCode::Char('s') => app.run_command("setup"),
        KeyCode::Char('a') => app.run_command("agent"),
        KeyCode::Char('r') => app.run_command("run"),

        // Re-fetch data.json from the agent's endpoint
        KeyCode::Char('R') => app.refresh_agent_data(),

        // Edit the selected configuration value
        KeyCode::Enter | KeyCode::Char('e') => {
            if app.workspace_focus == WorkspacePane::Config {
                app.begin_field_edit();
            }
        }

        KeyCode::Char('u') | KeyCode::Char('d') => {
            if app.workspace_id.is_some() {
                app.confirm_uninstall = true;
            }
        }

        // Make this the default chat agent
        KeyCode::Char('D') => {
            if let Some(id) = app.workspace_id.clone() {
                match crate::config::Config::save_default_agent(&id) {
                    Ok(()) => {
                        app.config.default_agent = Some(id.clone());
                        app.status = Some(format!("{id} is now the default agent"));
                    }
                    Err(err) => {
                        app.status = Some(crate::app::user_error("Failed to save config", &err));
                    }
                }
            }
        }

        KeyCode::Char('c') => {
            let id = app.workspace_id.clone();
            app.open_chat(id);
        }

        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Esc | KeyCode::Char('h') => {
            app.screen = Screen::Hub;
        }

        KeyCode::Char('i') => {
            app.input_mode = InputMode::Editing;
        }

        // Manual transcript scrolling; leaves auto-scroll alone unless the
        // reader lands back near the bottom
        KeyCode::Char('j') | KeyCode::Down => app.chat_scroll.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.chat_scroll.scroll_up(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let half = app.chat_area_height / 2;
            app.chat_scroll.scroll_down(half.max(1));
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let half = app.chat_area_height / 2;
            app.chat_scroll.scroll_up(half.max(1));
        }
        KeyCode::Char('G') => app.chat_scroll.anchor_to_bottom(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match app.screen {
        Screen::Hub => handle_search_editing(app, key),
        Screen::Workspace => handle_field_editing(app, key),
        Screen::Chat => handle_chat_editing(app, key),
        _ => app.input_mode = InputMode::Normal,
    }
}

fn handle_search_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Enter => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Backspace => {
            app.search_input.pop();
            app.refresh_filter();
        }
        KeyCode::Char(c) => {
            app.search_input.push(c);
            app.refresh_filter();
        }
        _ => {}
    }
}

fn handle_field_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.cancel_field_edit(),
        KeyCode::Enter => app.commit_field_edit(),
        KeyCode::Backspace => {
            if app.field_cursor > 0 {
                app.field_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.field_input, app.field_cursor);
                app.field_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.field_input.chars().count();
            if app.field_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.field_input, app.field_cursor);
                app.field_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.field_cursor = app.field_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.field_input.chars().count();
            app.field_cursor = (app.field_cursor + 1).min(char_count);
        }
        KeyCode::Home => app.field_cursor = 0,
        KeyCode::End => app.field_cursor = app.field_input.chars().count(),
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.field_input, app.field_cursor);
            app.field_input.insert(byte_pos, c);
            app.field_cursor += 1;
        }
        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => app.submit_chat(),
        KeyCode::Backspace => {
            if app.chat_cursor > 0 {
                app.chat_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.chat_input.chars().count();
            if app.chat_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.chat_cursor = app.chat_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.chat_input.chars().count();
            app.chat_cursor = (app.chat_cursor + 1).min(char_count);
        }
        KeyCode::Home => app.chat_cursor = 0,
        KeyCode::End => app.chat_cursor = app.chat_input.chars().count(),
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
            app.chat_input.insert(byte_pos, c);
            app.chat_cursor += 1;
        }
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_list = app.list_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_content = app
        .content_area
        .map(|r| point_in_rect(x, y, r))
        .unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => match app.screen {
            Screen::Hub => {
                if in_list {
                    app.hub_nav_down();
                }
            }
            Screen::Workspace => {
                if in_list {
                    app.workspace_nav(true);
                } else if in_content {
                    app.config_nav(true);
                }
            }
            Screen::Chat => {
                if in_content {
                    app.chat_scroll.scroll_down(3);
                }
            }
            Screen::Detail => {}
        },
        MouseEventKind::ScrollUp => match app.screen {
            Screen::Hub => {
                if in_list {
                    app.hub_nav_up();
                }
            }
            Screen::Workspace => {
                if in_list {
                    app.workspace_nav(false);
                } else if in_content {
                    app.config_nav(false);
                }
            }
            Screen::Chat => {
                if in_content {
                    app.chat_scroll.scroll_up(3);
                }
            }
            Screen::Detail => {}
        },
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_to_byte_index_handles_multibyte() {
        let s = "héllo";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 99), s.len());
    }

    #[test]
    fn test_point_in_rect() {
        let rect = Rect::new(2, 2, 10, 5);
        assert!(point_in_rect(2, 2, rect));
        assert!(point_in_rect(11, 6, rect));
        assert!(!point_in_rect(12, 2, rect));
        assert!(!point_in_rect(2, 7, rect));
    }
}
