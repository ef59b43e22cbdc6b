//! Command parsing for the interactive front end.

use chrono::NaiveDate;
use common::{AppointmentId, VaccineName};
use thiserror::Error;

/// A parsed user command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreatePatient { username: String, password: String },
    CreateCaregiver { username: String, password: String },
    LoginPatient { username: String, password: String },
    LoginCaregiver { username: String, password: String },
    SearchCaregiverSchedule { date: NaiveDate },
    Reserve { date: NaiveDate, vaccine: VaccineName },
    UploadAvailability { date: NaiveDate },
    Cancel { appointment_id: AppointmentId },
    AddDoses { vaccine: VaccineName, amount: u32 },
    ShowAppointments,
    Logout,
    Quit,
}

/// Errors produced while parsing a command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty input")]
    Empty,

    #[error("invalid operation name: {0}")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("please enter a valid date (YYYY-MM-DD): {0}")]
    InvalidDate(String),

    #[error("please enter a valid appointment id: {0}")]
    InvalidAppointmentId(String),

    #[error("please enter a positive number of doses: {0}")]
    InvalidAmount(String),
}

fn parse_date(token: &str) -> Result<NaiveDate, ParseError> {
    token
        .parse()
        .map_err(|_| ParseError::InvalidDate(token.to_string()))
}

fn two_args<'a>(
    tokens: &[&'a str],
    usage: &'static str,
) -> Result<(&'a str, &'a str), ParseError> {
    match tokens {
        [_, first, second] => Ok((first, second)),
        _ => Err(ParseError::Usage(usage)),
    }
}

fn one_arg<'a>(tokens: &[&'a str], usage: &'static str) -> Result<&'a str, ParseError> {
    match tokens {
        [_, only] => Ok(only),
        _ => Err(ParseError::Usage(usage)),
    }
}

fn no_args(tokens: &[&str], usage: &'static str) -> Result<(), ParseError> {
    if tokens.len() == 1 {
        Ok(())
    } else {
        Err(ParseError::Usage(usage))
    }
}

impl std::str::FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&operation) = tokens.first() else {
            return Err(ParseError::Empty);
        };

        match operation {
            "create_patient" => {
                let (username, password) =
                    two_args(&tokens, "create_patient <username> <password>")?;
                Ok(Command::CreatePatient {
                    username: username.to_string(),
                    password: password.to_string(),
                })
            }
            "create_caregiver" => {
                let (username, password) =
                    two_args(&tokens, "create_caregiver <username> <password>")?;
                Ok(Command::CreateCaregiver {
                    username: username.to_string(),
                    password: password.to_string(),
                })
            }
            "login_patient" => {
                let (username, password) =
                    two_args(&tokens, "login_patient <username> <password>")?;
                Ok(Command::LoginPatient {
                    username: username.to_string(),
                    password: password.to_string(),
                })
            }
            "login_caregiver" => {
                let (username, password) =
                    two_args(&tokens, "login_caregiver <username> <password>")?;
                Ok(Command::LoginCaregiver {
                    username: username.to_string(),
                    password: password.to_string(),
                })
            }
            "search_caregiver_schedule" => {
                let date = one_arg(&tokens, "search_caregiver_schedule <date>")?;
                Ok(Command::SearchCaregiverSchedule {
                    date: parse_date(date)?,
                })
            }
            "reserve" => {
                let (date, vaccine) = two_args(&tokens, "reserve <date> <vaccine>")?;
                Ok(Command::Reserve {
                    date: parse_date(date)?,
                    vaccine: VaccineName::new(vaccine),
                })
            }
            "upload_availability" => {
                let date = one_arg(&tokens, "upload_availability <date>")?;
                Ok(Command::UploadAvailability {
                    date: parse_date(date)?,
                })
            }
            "cancel" => {
                let id = one_arg(&tokens, "cancel <appointment_id>")?;
                Ok(Command::Cancel {
                    appointment_id: id
                        .parse()
                        .map_err(|_| ParseError::InvalidAppointmentId(id.to_string()))?,
                })
            }
            "add_doses" => {
                let (vaccine, amount) = two_args(&tokens, "add_doses <vaccine> <number>")?;
                Ok(Command::AddDoses {
                    vaccine: VaccineName::new(vaccine),
                    amount: amount
                        .parse()
                        .map_err(|_| ParseError::InvalidAmount(amount.to_string()))?,
                })
            }
            "show_appointments" => {
                no_args(&tokens, "show_appointments")?;
                Ok(Command::ShowAppointments)
            }
            "logout" => {
                no_args(&tokens, "logout")?;
                Ok(Command::Logout)
            }
            "quit" => {
                no_args(&tokens, "quit")?;
                Ok(Command::Quit)
            }
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}
