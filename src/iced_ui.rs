use iced::widget::{button, column, container, row, scrollable, text, text_input, Space};
use iced::{
    application, time, Background, Border, Color, Element, Length, Shadow, Size, Subscription,
    Task, Theme,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

use crate::client::{DataFormat, LoadType, MorkClient};
use crate::commands::CommandKind;
use crate::config::PlaygroundConfig;
use crate::lifecycle::LifecycleState;
use crate::panels::{CommandForm, Notification, NotificationLevel, PanelAction};
use crate::shell::Shell;
use crate::stream::LogLevel;

const TOAST_TTL: Duration = Duration::from_secs(5);
const REFRESH_EVERY: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
pub struct IcedUiLaunchConfig {
    pub config: PlaygroundConfig,
    pub client: MorkClient,
    /// Runtime the command lifecycles are spawned on.
    pub runtime: Handle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FormField {
    SubExpr,
    Pattern,
    Template,
    Uri,
    Expr,
    Location,
    Expression,
    Millis,
    Path,
    UploadPath,
    Neo4jUri,
    Neo4jUser,
    Neo4jPassword,
}

#[derive(Clone, Debug)]
enum Message {
    Tick,
    CommandSelected(CommandKind),
    FieldEdited(FormField, String),
    FormatPicked(DataFormat),
    LoadTypePicked(LoadType),
    LockExprToggled,
    WaitForIdleToggled,
    RunPressed(PanelAction),
    CancelPressed,
    ClearLogPressed,
    ToastDismissed(usize),
    CopyToClipboard(String),
}

struct PlaygroundApp {
    shell: Shell,
    toasts: Vec<(Notification, Instant)>,
    millis_text: String,
    upload_text: String,
}

impl PlaygroundApp {
    fn new(flags: IcedUiLaunchConfig) -> Self {
        Self {
            shell: Shell::with_client(flags.config, flags.client, flags.runtime),
            toasts: vec![],
            millis_text: "1000".to_string(),
            upload_text: String::new(),
        }
    }

    fn sync(&mut self) {
        let panel = self.shell.panel_mut();
        panel.refresh();
        let now = Instant::now();
        self.toasts
            .extend(panel.take_notifications().into_iter().map(|n| (n, now)));
        self.toasts.retain(|(_, at)| now.duration_since(*at) < TOAST_TTL);
    }

    fn reset_inputs(&mut self) {
        self.millis_text = "1000".to_string();
        self.upload_text.clear();
    }
}

pub fn launch_ui(config: IcedUiLaunchConfig) -> iced::Result {
    application(
        move || (PlaygroundApp::new(config.clone()), Task::none()),
        update,
        view,
    )
    .title(app_title)
    .theme(app_theme)
    .window(iced::window::Settings {
        size: Size::new(1180.0, 780.0),
        min_size: Some(Size::new(900.0, 600.0)),
        ..Default::default()
    })
    .subscription(subscription)
    .run()
}

fn app_title(state: &PlaygroundApp) -> String {
    format!("MORK Playground · {}", state.shell.selected().label())
}

fn app_theme(_state: &PlaygroundApp) -> Theme {
    Theme::Dark
}

fn subscription(state: &PlaygroundApp) -> Subscription<Message> {
    let panel = state.shell.panel();
    if panel.is_busy() || panel.is_streaming() || !state.toasts.is_empty() {
        time::every(REFRESH_EVERY).map(|_| Message::Tick)
    } else {
        Subscription::none()
    }
}

fn update(state: &mut PlaygroundApp, message: Message) -> Task<Message> {
    match message {
        Message::Tick => {
            state.sync();
            Task::none()
        }
        Message::CommandSelected(kind) => {
            state.shell.select(kind);
            state.reset_inputs();
            Task::none()
        }
        Message::FieldEdited(field, value) => {
            edit_field(state, field, value);
            Task::none()
        }
        Message::FormatPicked(format) => {
            match state.shell.panel_mut().form_mut() {
                CommandForm::Export(request) => request.format = format,
                CommandForm::Import(request) => request.format = format,
                _ => {}
            }
            Task::none()
        }
        Message::LoadTypePicked(load_type) => {
            if let CommandForm::Neo4j(form) = state.shell.panel_mut().form_mut() {
                form.load.load_type = load_type;
            }
            Task::none()
        }
        Message::LockExprToggled => {
            if let CommandForm::Busywait(request) = state.shell.panel_mut().form_mut() {
                request.lock_expr = !request.lock_expr;
            }
            Task::none()
        }
        Message::WaitForIdleToggled => {
            if let CommandForm::Stop(request) = state.shell.panel_mut().form_mut() {
                request.wait_for_idle = !request.wait_for_idle;
            }
            Task::none()
        }
        Message::RunPressed(action) => {
            state.shell.panel_mut().submit(action);
            state.sync();
            Task::none()
        }
        Message::CancelPressed => {
            state.shell.panel_mut().cancel();
            state.sync();
            Task::none()
        }
        Message::ClearLogPressed => {
            state.shell.panel_mut().clear_status_log();
            Task::none()
        }
        Message::ToastDismissed(index) => {
            if index < state.toasts.len() {
                state.toasts.remove(index);
            }
            Task::none()
        }
        Message::CopyToClipboard(value) => iced::clipboard::write(value),
    }
}

fn edit_field(state: &mut PlaygroundApp, field: FormField, value: String) {
    if field == FormField::Millis {
        state.millis_text = value.clone();
    }
    if field == FormField::UploadPath {
        state.upload_text = value.clone();
        let file = Some(value.trim())
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        state.shell.panel_mut().set_upload_file(file);
        return;
    }

    match (state.shell.panel_mut().form_mut(), field) {
        (CommandForm::Clear(request), FormField::SubExpr) => request.sub_expr = value,
        (CommandForm::Copy(request), FormField::Pattern) => request.pattern = value,
        (CommandForm::Copy(request), FormField::Template) => request.template = value,
        (CommandForm::Count(request), FormField::Pattern) => request.pattern = value,
        (CommandForm::Export(request), FormField::Pattern) => request.pattern = value,
        (CommandForm::Export(request), FormField::Template) => request.template = value,
        (CommandForm::Export(request), FormField::Uri) => request.uri = value,
        (CommandForm::Import(request), FormField::Pattern) => request.pattern = value,
        (CommandForm::Import(request), FormField::Template) => request.template = value,
        (CommandForm::Import(request), FormField::Uri) => request.uri = value,
        (CommandForm::Transform(request), FormField::Expr) => request.expr = value,
        (CommandForm::MettaThread(request), FormField::Location) => request.location = value,
        (CommandForm::MettaThread(request), FormField::Expression) => request.expression = value,
        (CommandForm::Suspend(request), FormField::Location) => request.location = value,
        // Unparseable input fails range validation on submit.
        (CommandForm::Busywait(request), FormField::Millis) => {
            request.millis = value.trim().parse().unwrap_or(0)
        }
        (CommandForm::Status(request), FormField::Path) => request.path = value,
        (CommandForm::StatusStream(request), FormField::Path) => request.path = value,
        (CommandForm::Neo4j(form), FormField::Neo4jUri) => form.connect.uri = value,
        (CommandForm::Neo4j(form), FormField::Neo4jUser) => form.connect.user = value,
        (CommandForm::Neo4j(form), FormField::Neo4jPassword) => form.connect.password = value,
        _ => {}
    }
}

fn view(state: &PlaygroundApp) -> Element<'_, Message> {
    let header = row![
        column![
            text("MORK Playground").size(28),
            text("Control panel for a MORK server").size(14)
        ]
        .spacing(2),
        Space::new().width(Length::Fill),
        text(state.shell.config().server_url.clone()).size(14)
    ]
    .spacing(16)
    .width(Length::Fill)
    .align_y(iced::Alignment::Center);

    let content = column![
        header,
        row![view_sidebar(state), view_panel(state)]
            .spacing(12)
            .height(Length::Fill),
        view_toasts(state)
    ]
    .spacing(12)
    .padding(16)
    .height(Length::Fill);

    container(container(content).height(Length::Fill).style(glass_shell))
        .width(Length::Fill)
        .height(Length::Fill)
        .center_x(Length::Fill)
        .into()
}

fn view_sidebar(state: &PlaygroundApp) -> Element<'_, Message> {
    let selected = state.shell.selected();
    let groups = Shell::groups().fold(column!().spacing(14), |col, (group, kinds)| {
        let entries = kinds
            .into_iter()
            .fold(column!().spacing(4), |entries, kind| {
                entries.push(
                    button(text(kind.label()).size(14))
                        .width(Length::Fill)
                        .padding([6, 12])
                        .style(if kind == selected {
                            iced::widget::button::primary
                        } else {
                            iced::widget::button::secondary
                        })
                        .on_press(Message::CommandSelected(kind)),
                )
            });
        col.push(column![text(group.label()).size(12), entries].spacing(6))
    });

    container(scrollable(groups).height(Length::Fill))
        .padding(12)
        .width(220)
        .height(Length::Fill)
        .style(glass_panel)
        .into()
}

fn view_panel(state: &PlaygroundApp) -> Element<'_, Message> {
    let panel = state.shell.panel();
    let kind = panel.kind();
    let busy = panel.is_busy();

    let status_line = match panel.state() {
        LifecycleState::Idle => String::new(),
        LifecycleState::Submitting => "Sending request...".to_string(),
        LifecycleState::Polling { ticks, .. } => format!("Waiting for the server (check {ticks})"),
        LifecycleState::Settled(_) => "Done".to_string(),
    };

    let mut actions = row!().spacing(10).align_y(iced::Alignment::Center);
    if kind == CommandKind::Neo4j {
        actions = actions
            .push(run_button("Connect", busy, PanelAction::Connect))
            .push(run_button("Load Data", busy, PanelAction::Load));
    } else if kind == CommandKind::StatusStream {
        let streaming = panel.is_streaming();
        actions = actions
            .push(run_button("Start Stream", streaming, PanelAction::Run))
            .push(
                button("Stop Stream")
                    .padding([10, 16])
                    .style(iced::widget::button::danger)
                    .on_press_maybe(streaming.then_some(Message::CancelPressed)),
            )
            .push(
                button("Clear Log")
                    .padding([10, 16])
                    .on_press(Message::ClearLogPressed),
            );
    } else {
        actions = actions.push(run_button(kind.label(), busy, PanelAction::Run));
    }
    if busy {
        actions = actions.push(
            button("Cancel")
                .padding([10, 16])
                .style(iced::widget::button::danger)
                .on_press(Message::CancelPressed),
        );
    }
    actions = actions.push(text(status_line).size(13));

    let output: Element<'_, Message> = if kind == CommandKind::StatusStream {
        view_status_log(state)
    } else {
        view_output(state)
    };

    container(
        column![
            text(kind.label()).size(22),
            text(kind.description()).size(13),
            view_form(state),
            actions,
            output
        ]
        .spacing(12),
    )
    .padding(16)
    .width(Length::Fill)
    .height(Length::Fill)
    .style(glass_panel)
    .into()
}

fn run_button(label: &str, busy: bool, action: PanelAction) -> Element<'_, Message> {
    button(text(label))
        .padding([10, 16])
        .style(iced::widget::button::primary)
        .on_press_maybe((!busy).then_some(Message::RunPressed(action)))
        .into()
}

fn field<'a>(label: &'a str, placeholder: &'a str, value: &'a str, id: FormField) -> Element<'a, Message> {
    column![
        text(label).size(13),
        text_input(placeholder, value)
            .on_input(move |value| Message::FieldEdited(id, value))
            .padding(10)
            .width(Length::Fill)
    ]
    .spacing(4)
    .into()
}

fn toggle(label: &str, on: bool, message: Message) -> Element<'_, Message> {
    button(text(format!("{} {label}", if on { "☑" } else { "☐" })))
        .padding([8, 12])
        .style(iced::widget::button::secondary)
        .on_press(message)
        .into()
}

fn choice_row<'a, T: Copy + PartialEq + std::fmt::Display + 'a>(
    options: &'a [T],
    current: T,
    on_pick: fn(T) -> Message,
) -> Element<'a, Message> {
    options
        .iter()
        .fold(row!().spacing(6), |row, option| {
            row.push(
                button(text(option.to_string()).size(13))
                    .padding([6, 10])
                    .style(if *option == current {
                        iced::widget::button::primary
                    } else {
                        iced::widget::button::secondary
                    })
                    .on_press(on_pick(*option)),
            )
        })
        .into()
}

fn view_form(state: &PlaygroundApp) -> Element<'_, Message> {
    let form = match state.shell.panel().form() {
        CommandForm::Clear(request) => column![field(
            "Sub Expression",
            "$x",
            &request.sub_expr,
            FormField::SubExpr
        )],
        CommandForm::Copy(request) => column![
            field("Pattern", "(test (data $v) _)", &request.pattern, FormField::Pattern),
            field("Template", "(result $v)", &request.template, FormField::Template),
        ],
        CommandForm::Count(request) => column![field(
            "Pattern",
            "(test (data $v) _)",
            &request.pattern,
            FormField::Pattern
        )],
        CommandForm::Export(request) => column![
            field("Pattern", "$x", &request.pattern, FormField::Pattern),
            field("Template", "$x", &request.template, FormField::Template),
            field("Destination URI (optional)", "file:///tmp/out.metta", &request.uri, FormField::Uri),
            choice_row(&DataFormat::ALL, request.format, Message::FormatPicked),
        ],
        CommandForm::Import(request) => column![
            field("URI", "https://example.com/data.json", &request.uri, FormField::Uri),
            field("Pattern", "$x", &request.pattern, FormField::Pattern),
            field("Template", "$x", &request.template, FormField::Template),
            choice_row(&DataFormat::ALL, request.format, Message::FormatPicked),
        ],
        CommandForm::Upload(_) => column![field(
            "File",
            "/path/to/space.metta",
            &state.upload_text,
            FormField::UploadPath
        )],
        CommandForm::Transform(request) => column![field(
            "S-Expression",
            "(Node Node)",
            &request.expr,
            FormField::Expr
        )],
        CommandForm::MettaThread(request) => column![
            field("Location (optional)", "thread_...", &request.location, FormField::Location),
            field("Expression", "(exec (+ 1 2 3))", &request.expression, FormField::Expression),
        ],
        CommandForm::Suspend(request) => column![field(
            "Thread Location",
            "thread_...",
            &request.location,
            FormField::Location
        )],
        CommandForm::Busywait(request) => column![
            field("Duration (ms)", "1000", &state.millis_text, FormField::Millis),
            toggle("Lock expression", request.lock_expr, Message::LockExprToggled),
        ],
        CommandForm::Stop(request) => column![toggle(
            "Wait for idle",
            request.wait_for_idle,
            Message::WaitForIdleToggled
        )],
        CommandForm::Status(request) | CommandForm::StatusStream(request) => {
            column![field("Path", "/status", &request.path, FormField::Path)]
        }
        CommandForm::Neo4j(form) => column![
            field("URI", "bolt://localhost:7687", &form.connect.uri, FormField::Neo4jUri),
            field("Username", "neo4j", &form.connect.user, FormField::Neo4jUser),
            column![
                text("Password").size(13),
                text_input("password", &form.connect.password)
                    .secure(true)
                    .on_input(|value| Message::FieldEdited(FormField::Neo4jPassword, value))
                    .padding(10)
                    .width(Length::Fill)
            ]
            .spacing(4),
            text(if state.shell.panel().neo4j_connected() {
                "Connected"
            } else {
                "Not connected"
            })
            .size(13),
            choice_row(&LoadType::ALL, form.load.load_type, Message::LoadTypePicked),
        ],
    };
    form.spacing(10).into()
}

fn view_output(state: &PlaygroundApp) -> Element<'_, Message> {
    let panel = state.shell.panel();
    let error_line = match panel.last_error() {
        Some(message) => text(format!("error: {message}"))
            .size(13)
            .color([0.95, 0.45, 0.45]),
        None => text(""),
    };
    let Some(result) = panel.output() else {
        return column![
            error_line,
            container(text("No output yet").size(13))
                .padding(12)
                .width(Length::Fill)
                .style(glass_panel)
        ]
        .spacing(6)
        .into();
    };
    let rendered = result.render();

    column![
        error_line,
        row![
            text("Output").size(14),
            Space::new().width(Length::Fill),
            button(text("📋").size(14))
                .padding(6)
                .on_press(Message::CopyToClipboard(rendered.clone()))
        ]
        .align_y(iced::Alignment::Center),
        container(scrollable(text(rendered).size(13)).height(Length::Fill))
            .padding(12)
            .width(Length::Fill)
            .height(Length::Fill)
            .style(glass_panel)
    ]
    .spacing(6)
    .height(Length::Fill)
    .into()
}

fn view_status_log(state: &PlaygroundApp) -> Element<'_, Message> {
    let list = state
        .shell
        .panel()
        .status_log()
        .iter()
        .fold(column!().spacing(4), |col, entry| {
            let line = text(format!("[{}] {}", entry.timestamp, entry.message)).size(13);
            col.push(match entry.level {
                LogLevel::Info => line,
                LogLevel::Success => line.color([0.45, 0.85, 0.55]),
                LogLevel::Error => line.color([0.95, 0.45, 0.45]),
            })
        });

    container(
        scrollable(list)
            .height(Length::Fill)
            .width(Length::Fill)
            .anchor_bottom(),
    )
    .padding(12)
    .width(Length::Fill)
    .height(Length::Fill)
    .style(glass_panel)
    .into()
}

fn view_toasts(state: &PlaygroundApp) -> Element<'_, Message> {
    state
        .toasts
        .iter()
        .enumerate()
        .fold(column!().spacing(6), |col, (index, (toast, _))| {
            let title = match toast.level {
                NotificationLevel::Info => text(toast.title.clone()).size(14),
                NotificationLevel::Success => {
                    text(toast.title.clone()).size(14).color([0.45, 0.85, 0.55])
                }
                NotificationLevel::Error => {
                    text(toast.title.clone()).size(14).color([0.95, 0.45, 0.45])
                }
            };
            col.push(
                container(
                    row![
                        column![title, text(toast.message.clone()).size(13)].spacing(2),
                        Space::new().width(Length::Fill),
                        button(text("✕").size(12))
                            .padding(6)
                            .on_press(Message::ToastDismissed(index))
                    ]
                    .align_y(iced::Alignment::Center),
                )
                .padding(10)
                .width(Length::Fill)
                .style(glass_panel),
            )
        })
        .into()
}

fn glass_shell(_theme: &Theme) -> iced::widget::container::Style {
    iced::widget::container::Style {
        text_color: None,
        background: Some(Background::Color(Color::from_rgba(0.07, 0.10, 0.18, 0.65))),
        border: Border {
            radius: 18.0.into(),
            width: 1.0,
            color: Color::from_rgba(1.0, 1.0, 1.0, 0.10),
        },
        shadow: Shadow::default(),
        snap: false,
    }
}

fn glass_panel(_theme: &Theme) -> iced::widget::container::Style {
    iced::widget::container::Style {
        text_color: None,
        background: Some(Background::Color(Color::from_rgba(0.10, 0.14, 0.24, 0.58))),
        border: Border {
            radius: 16.0.into(),
            width: 1.0,
            color: Color::from_rgba(1.0, 1.0, 1.0, 0.12),
        },
        shadow: Shadow::default(),
        snap: false,
    }
}
