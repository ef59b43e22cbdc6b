//! The interactive session loop: parse a line, dispatch to the engine,
//! render a one-line reply.

use common::{Role, Username};
use engine::{ReservationEngine, ReservationError, Session};
use store::{Appointment, AppointmentLedger, AvailabilityStore, InventoryStore};

use crate::accounts::AccountDirectory;
use crate::command::{Command, ParseError};

/// Greeting printed once at startup.
pub const GREETING: &str = "\
Welcome to the COVID-19 Vaccine Reservation Scheduling Application!
*** Please enter one of the following commands ***
> create_patient <username> <password>
> create_caregiver <username> <password>
> login_patient <username> <password>
> login_caregiver <username> <password>
> search_caregiver_schedule <date>
> reserve <date> <vaccine>
> upload_availability <date>
> cancel <appointment_id>
> add_doses <vaccine> <number>
> show_appointments
> logout
> quit";

const LOGIN_FIRST: &str = "Please login first.";

/// What the loop should do after a dispatched line.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Print the reply (empty replies are skipped) and keep going.
    Reply(String),
    /// Exit the loop.
    Quit,
}

/// Per-process application state: the engine, the account directory, and
/// the current session, if any.
pub struct App<A, I, L> {
    engine: ReservationEngine<A, I, L>,
    accounts: AccountDirectory,
    session: Option<Session>,
}

impl<A, I, L> App<A, I, L>
where
    A: AvailabilityStore,
    I: InventoryStore,
    L: AppointmentLedger,
{
    /// Creates the application over an engine and an account directory.
    pub fn new(engine: ReservationEngine<A, I, L>, accounts: AccountDirectory) -> Self {
        Self {
            engine,
            accounts,
            session: None,
        }
    }

    /// Parses and executes one input line.
    pub async fn dispatch(&mut self, line: &str) -> Outcome {
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(ParseError::Empty) => return Outcome::Reply(String::new()),
            Err(e) => return Outcome::Reply(e.to_string()),
        };

        let reply = match command {
            Command::CreatePatient { username, password } => {
                self.create_account(&username, &password, Role::Patient)
            }
            Command::CreateCaregiver { username, password } => {
                self.create_account(&username, &password, Role::Caregiver)
            }
            Command::LoginPatient { username, password } => {
                self.login(&username, &password, Role::Patient)
            }
            Command::LoginCaregiver { username, password } => {
                self.login(&username, &password, Role::Caregiver)
            }
            Command::SearchCaregiverSchedule { date } => match &self.session {
                None => LOGIN_FIRST.to_string(),
                Some(session) => match self.engine.schedule_on(session, date).await {
                    Ok(schedule) => {
                        let mut out = String::new();
                        for caregiver in &schedule.caregivers {
                            out.push_str(caregiver.as_str());
                            out.push('\n');
                        }
                        for (vaccine, doses) in &schedule.vaccines {
                            out.push_str(&format!("{vaccine} {doses}\n"));
                        }
                        if out.is_empty() {
                            format!("No availability on {date}.")
                        } else {
                            out.trim_end().to_string()
                        }
                    }
                    Err(e) => render_error(e),
                },
            },
            Command::Reserve { date, vaccine } => match &self.session {
                None => "Please login as a patient first.".to_string(),
                Some(session) => match self.engine.reserve(session, date, &vaccine).await {
                    Ok(confirmation) => format!(
                        "Appointment ID {}, Caregiver username {}",
                        confirmation.appointment_id, confirmation.caregiver
                    ),
                    Err(e) => render_error(e),
                },
            },
            Command::UploadAvailability { date } => match &self.session {
                None => "Please login as a caregiver first.".to_string(),
                Some(session) => match self.engine.publish_availability(session, date).await {
                    Ok(()) => "Availability uploaded!".to_string(),
                    Err(e) => render_error(e),
                },
            },
            Command::Cancel { appointment_id } => match &self.session {
                None => LOGIN_FIRST.to_string(),
                Some(session) => match self.engine.cancel(session, appointment_id).await {
                    Ok(()) => format!("Appointment {appointment_id} cancelled."),
                    Err(e) => render_error(e),
                },
            },
            Command::AddDoses { vaccine, amount } => match &self.session {
                None => "Please login as a caregiver first.".to_string(),
                Some(session) => match self.engine.add_doses(session, &vaccine, amount).await {
                    Ok(_) => "Doses updated!".to_string(),
                    Err(e) => render_error(e),
                },
            },
            Command::ShowAppointments => match &self.session {
                None => LOGIN_FIRST.to_string(),
                Some(session) => match self.engine.appointments_for(session).await {
                    Ok(appointments) if appointments.is_empty() => {
                        "No appointments scheduled.".to_string()
                    }
                    Ok(appointments) => appointments
                        .iter()
                        .map(|a| render_appointment(a, session.role))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    Err(e) => render_error(e),
                },
            },
            Command::Logout => {
                if self.session.take().is_some() {
                    "Successfully logged out.".to_string()
                } else {
                    LOGIN_FIRST.to_string()
                }
            }
            Command::Quit => return Outcome::Quit,
        };

        Outcome::Reply(reply)
    }

    fn create_account(&self, username: &str, password: &str, role: Role) -> String {
        let username = Username::new(username);
        match self.accounts.create(&username, password, role) {
            Ok(()) => format!("Created user {username}"),
            Err(e) => e.to_string(),
        }
    }

    fn login(&mut self, username: &str, password: &str, role: Role) -> String {
        if self.session.is_some() {
            return "User already logged in, log out first.".to_string();
        }
        let username = Username::new(username);
        match self.accounts.verify(&username, password, role) {
            Ok(()) => {
                let reply = format!("Logged in as {username}");
                self.session = Some(Session::new(username, role));
                reply
            }
            Err(e) => e.to_string(),
        }
    }
}

/// One appointment line, showing the counterparty for the caller's role.
fn render_appointment(appointment: &Appointment, role: Role) -> String {
    let counterparty = match role {
        Role::Caregiver => &appointment.patient,
        Role::Patient => &appointment.caregiver,
    };
    format!(
        "{} {} {} {}",
        appointment.id, appointment.vaccine, appointment.date, counterparty
    )
}

/// Maps engine errors to user-facing messages. Storage and consistency
/// detail goes to the log, not the terminal.
fn render_error(e: ReservationError) -> String {
    match e {
        ReservationError::TransientFailure(detail) => {
            tracing::error!(error = %detail, "storage failure");
            "A storage error occurred, please try again.".to_string()
        }
        ReservationError::ConsistencyFault(detail) => {
            tracing::error!(error = %detail, "consistency fault");
            "Internal error, the operation was aborted.".to_string()
        }
        other => other.to_string(),
    }
}

/// Runs the interactive loop until `quit` or end of input.
pub async fn run<A, I, L>(engine: ReservationEngine<A, I, L>, accounts: AccountDirectory)
where
    A: AvailabilityStore,
    I: InventoryStore,
    L: AppointmentLedger,
{
    use tokio::io::AsyncBufReadExt;

    let mut app = App::new(engine, accounts);
    println!("{GREETING}");
    prompt();

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match app.dispatch(&line).await {
            Outcome::Reply(reply) => {
                if !reply.is_empty() {
                    println!("{reply}");
                }
            }
            Outcome::Quit => {
                println!("Bye!");
                return;
            }
        }
        prompt();
    }
}

fn prompt() {
    use std::io::Write;
    print!("> ");
    let _ = std::io::stdout().flush();
}
