//! Patient-facing message texts and staff push titles.

pub const TITLE_ACCEPTED: &str = "An Appointment Has Been Accepted";
pub const TITLE_REJECTED: &str = "An Appointment Has Been Rejected";
pub const TITLE_PACKAGE: &str = "A Package Has Been Registered";
pub const TITLE_CANCELLED: &str = "Appointment Cancelled";

/// `date_time` is the wire string, `YYYY/MM/DD & H:MM AM|PM`.
pub fn confirmation(date_time: &str, therapist_name: &str) -> String {
    let (date, time) = date_time.split_once(" & ").unwrap_or((date_time, ""));
    format!(
        "*APPOINTMENT CONFIRMATION*\n\n\
         Dear Patient,\n\n\
         Your appointment has been confirmed:\n\
         • *Date:* {date}\n\
         • *Time:* {time}\n\
         • *Therapist:* Dr. {therapist_name}\n\n\
         Please arrive 10 minutes early. If you need to reschedule, kindly contact us 24 hours in advance."
    )
}

pub fn rejection() -> String {
    "*APPOINTMENT REJECTED*\n\n\
     Dear Patient,\n\n\
     We're sorry, but your appointment request has been rejected. \
     Please contact the clinic to reschedule or for further information."
        .to_string()
}

pub fn cancellation() -> String {
    "*APPOINTMENT DELETED*\n\n\
     Dear Patient,\n\n\
     We're sorry, but your appointment has been deleted. \
     Please contact the clinic to reschedule at your earliest convenience."
        .to_string()
}

/// `time` is the clock part, e.g. `3:04 PM`.
pub fn reminder(therapist_name: &str, time: &str) -> String {
    format!(
        "Reminder: You have an appointment with {therapist_name} today at {time} (in 3 hours). \
         Please arrive 10 minutes early. If you need to reschedule, please contact us."
    )
}

pub fn accepted_push(date_time: &str, patient_name: &str) -> String {
    format!("Your appointment at {date_time} with {patient_name} has been accepted")
}

pub fn rejected_push(date_time: &str, patient_name: &str) -> String {
    format!("Your appointment at {date_time} with {patient_name} has been rejected")
}

pub fn cancelled_push(patient_name: &str, date_time: &str) -> String {
    format!("Your Appointment With {patient_name}, At {date_time} Has Been Cancelled")
}

pub fn package_push(patient_name: &str, description: &str, total_price_cents: i64) -> String {
    format!(
        "{patient_name} has registered \"{description}\" with a price of: {}.{:02}",
        total_price_cents / 100,
        total_price_cents % 100
    )
}
