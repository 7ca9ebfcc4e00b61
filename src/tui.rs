use crate::games::randolitics::{Affiliation, Participant, State, Variant};
use crate::games::GameState;

use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{self, Modifier, Style};
use ratatui::text::Span;
use ratatui::widgets::{Cell, List, Row, Table};

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Stylize,
    symbols::border,
    text::{Line, Text},
    widgets::{Block, Paragraph, Widget},
};

// Number of event lines kept on screen
const EVENT_HISTORY: usize = 16;

#[derive(Clone)]
pub struct WatchApp {
    pub variant: Variant,
    pub state: State,
    pub events: Vec<String>,
    pub finished: bool,
}

impl WatchApp {
    pub fn new(variant: Variant, state: State) -> Self {
        let finished = state.is_game_over();

        Self {
            variant,
            state,
            events: Vec::new(),
            finished,
        }
    }

    // Take in the state after a round along with what happened during it
    pub fn update(&mut self, state: &State, events: Vec<String>, finished: bool) {
        self.state = state.clone();
        self.events.extend(events);

        let excess = self.events.len().saturating_sub(EVENT_HISTORY);
        self.events.drain(..excess);
        self.finished = finished;
    }
}

fn affiliation_to_color(affiliation: Affiliation) -> style::Color {
    match affiliation {
        Affiliation::Progressive => style::Color::Red,
        Affiliation::Conservative => style::Color::Blue,
        Affiliation::Centrist => style::Color::Yellow,
    }
}

fn participant_row(p: &Participant) -> Row<'static> {
    let style = if p.is_eliminated {
        Style::default().fg(style::Color::DarkGray).add_modifier(Modifier::CROSSED_OUT)
    } else if p.is_figurehead {
        Style::default().add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    Row::new(vec![
        Cell::from(format!(" {}", p.name)),
        Cell::from(Span::styled(p.affiliation.label(), Style::default().fg(affiliation_to_color(p.affiliation)))),
        Cell::from(if p.is_figurehead { "★" } else { "" }),
        Cell::from(p.penalty_score.to_string()),
        Cell::from(if p.is_eliminated { "Banned" } else { "Active" }),
    ]).style(style)
}

impl Widget for WatchApp {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(self.state.participants.len() as u16 + 4),
                Constraint::Min(EVENT_HISTORY as u16 + 2),
            ])
            .split(area);

        let block = Block::bordered()
            .border_set(border::THICK);

        let figurehead = match self.state.figurehead() {
            Some(p) => format!("Figurehead: {} ({})", p.name, self.state.last_outcome_tag),
            None => "Figurehead: NA".to_string(),
        };

        let header_text = Text::from(vec![Line::from(vec![
            " ".into(),
            if self.finished {
                Span::styled(" GAME OVER ", Style::default().fg(style::Color::Red)).bold().add_modifier(Modifier::REVERSED)
            } else {
                Span::styled(" GAME RUNNING ", Style::default().fg(style::Color::Blue)).bold().add_modifier(Modifier::REVERSED)
            },
            format!(" {}, ", self.variant.title()).into(),
            format!("Active: {}/{}, ", self.state.active_count(), self.state.participants.len()).into(),
            format!("Round: {}, ", self.state.rounds).into(),
            figurehead.into(),
        ])]);

        Paragraph::new(header_text)
            .block(block)
            .render(layout[0], buf);

        let table = Table::new(
            self.state.participants.iter().map(participant_row),
            [
                Constraint::Min(16),
                Constraint::Length(14),
                Constraint::Length(12),
                Constraint::Length(8),
                Constraint::Length(8),
            ],
        )
            .header(Row::new(vec![" Name", "Affiliation", "Figurehead", "Score", "Status"]).style(Style::default().add_modifier(Modifier::BOLD)))
            .column_spacing(1)
            .block(Block::bordered().title(Line::from(" Participants ".bold()).centered()));

        Widget::render(table, layout[1], buf);

        let events = List::new(self.events.iter().map(|e| Line::from(format!(" {}", e))))
            .block(Block::bordered()
                .title(Line::from(" Events ".bold()).centered())
                .title_bottom(Line::from(vec![
                    " Play Round ".into(),
                    "<SPC> ".blue().bold(),
                    " Quit ".into(),
                    "<q> ".blue().bold(),
                ]).right_aligned()));

        Widget::render(events, layout[2], buf);
    }
}
