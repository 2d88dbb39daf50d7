use roombook::domain::{
    booking::BookingPolicy,
    reservation::Reservation,
    slot::TIME_FORMAT,
    Entity,
};

use crate::flash::Flash;

pub fn booking_form(policy: &BookingPolicy, flash: Option<&Flash>) -> String {
    let rooms = policy
        .rooms()
        .iter()
        .map(|room| format!(r#"<option value="{0}">{0}</option>"#, escape(room.as_str())))
        .collect::<String>();
    let slots = policy
        .slots()
        .iter()
        .map(|slot| {
            format!(
                r#"<label class="slot"><input type="checkbox" name="slots" value="{}"> {}</label>"#,
                slot.start().format(TIME_FORMAT),
                slot
            )
        })
        .collect::<String>();
    let body = format!(
        r#"<h1>Room reservation</h1>
<form method="post" action="/">
  <p><label>Name <input type="text" name="name" required></label></p>
  <p><label>Student ID <input type="text" name="student_id" required></label></p>
  <p><label>Room <select name="room">{rooms}</select></label></p>
  <p><label>Date <input type="date" name="date" required></label></p>
  <fieldset><legend>Time slots (continuous)</legend>{slots}</fieldset>
  <p><button type="submit">Reserve</button></p>
</form>
<p><a href="/reservations">All reservations</a></p>"#
    );
    layout("Room reservation", flash, &body)
}

pub fn reservation_list(reservations: &[Reservation], flash: Option<&Flash>) -> String {
    let mut rows = reservations
        .iter()
        .map(|r| {
            format!(
                r#"<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}-{}</td><td><a href="/delete/{}">Delete</a></td></tr>"#,
                r.date(),
                escape(r.room().as_str()),
                escape(r.name()),
                escape(r.student_id()),
                r.start_label(),
                r.end_label(),
                r.id()
            )
        })
        .collect::<String>();
    let body = format!(
        r#"<h1>Reservations</h1>
<table>
  <thead><tr><th>Date</th><th>Room</th><th>Name</th><th>Student ID</th><th>Time</th><th></th></tr></thead>
  <tbody>{rows}</tbody>
</table>
<p><a href="/">New reservation</a></p>"#
    );
    layout("Reservations", flash, &body)
}

pub fn not_found(message: &str) -> String {
    let body = format!(
        r#"<h1>Not Found</h1><p>{}</p><p><a href="/reservations">Back</a></p>"#,
        escape(message)
    );
    layout("Not Found", None, &body)
}

pub fn server_error() -> String {
    layout(
        "Internal Server Error",
        None,
        r#"<h1>Internal Server Error</h1><p>Please try again later.</p>"#,
    )
}

fn layout(title: &str, flash: Option<&Flash>, body: &str) -> String {
    let flash = flash
        .map(|f| {
            format!(
                r#"<div class="flash {}">{}</div>"#,
                f.level.css_class(),
                escape(&f.message)
            )
        })
        .unwrap_or_default();
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{}</title></head>
<body>
{}
{}
</body>
</html>"#,
        escape(title),
        flash,
        body
    )
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use roombook::domain::{reservation::Room, slot::generate_slots};

    use super::*;
    use crate::flash::FlashLevel;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<script>alert("x & y")</script>"#),
            "&lt;script&gt;alert(&quot;x &amp; y&quot;)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_booking_form() {
        let policy = BookingPolicy::new(vec![Room::new("A101")], generate_slots(8, 10).unwrap());
        let flash = Flash::new(FlashLevel::Danger, "<oops>");
        let html = booking_form(&policy, Some(&flash));
        assert!(html.contains(r#"<option value="A101">A101</option>"#));
        assert!(html.contains(r#"value="08:00"> 08:00-09:00"#));
        assert!(html.contains(r#"value="09:00"> 09:00-10:00"#));
        assert!(html.contains(r#"<div class="flash danger">&lt;oops&gt;</div>"#));
    }
}
