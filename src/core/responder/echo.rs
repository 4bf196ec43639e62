use time::{OffsetDateTime, Time};

use super::{ResponderError, ResponseGenerator};

/// Keyword-driven reference responder.
///
/// Matches the lower-cased utterance against a fixed list of topics, first
/// match wins; anything else is echoed back.
#[derive(Debug, Clone, Copy)]
pub struct EchoResponder {
    clock: fn() -> Time,
}

impl Default for EchoResponder {
    fn default() -> Self {
        Self { clock: local_time }
    }
}

impl EchoResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed clock for the time-of-day reply
    pub fn with_clock(clock: fn() -> Time) -> Self {
        Self { clock }
    }
}

impl ResponseGenerator for EchoResponder {
    fn respond(&self, utterance: &str) -> Result<String, ResponderError> {
        let input = utterance.to_lowercase();
        let has_word = |word: &str| {
            input
                .split(|c: char| !c.is_alphanumeric() && c != '\'')
                .any(|w| w == word)
        };

        let reply = if input.contains("hello") || has_word("hi") {
            "Hello! It's nice to hear from you. What would you like to talk about?".to_string()
        } else if input.contains("how are you") {
            "I'm doing great, thank you for asking! I'm here and ready to help you with anything you need.".to_string()
        } else if input.contains("goodbye") || has_word("bye") {
            "Goodbye! It was nice talking with you. Have a wonderful day!".to_string()
        } else if input.contains("help") {
            "I can help you with various tasks. Just tell me what you need, and I'll do my best to assist you.".to_string()
        } else if input.contains("weather") {
            "I don't have access to real-time weather data, but you could try asking a weather service for accurate forecasts.".to_string()
        } else if input.contains("time") {
            format!("The current time is {}.", format_clock((self.clock)()))
        } else {
            format!(
                "I heard you say: {input}. Is there anything specific you'd like me to help you with?"
            )
        };

        Ok(reply)
    }
}

/// 12-hour clock without a leading zero on the hour, e.g. `3:04 PM`
pub fn format_clock(time: Time) -> String {
    let (hour, minute) = (time.hour(), time.minute());
    let suffix = if hour < 12 { "AM" } else { "PM" };
    let hour12 = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{hour12}:{minute:02} {suffix}")
}

fn local_time() -> Time {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .time()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn afternoon() -> Time {
        Time::from_hms(15, 4, 0).unwrap_or(Time::MIDNIGHT)
    }

    #[test]
    fn test_greetings() {
        let responder = EchoResponder::new();
        let reply = responder.respond("Hello").unwrap();
        assert!(reply.starts_with("Hello! It's nice to hear from you."));
        assert_eq!(responder.respond("hi there").unwrap(), reply);
    }

    #[test]
    fn test_hi_inside_other_words_does_not_greet() {
        let responder = EchoResponder::new();
        let reply = responder.respond("this is nothing").unwrap();
        assert!(reply.starts_with("I heard you say: this is nothing."));
    }

    #[test]
    fn test_how_are_you() {
        let reply = EchoResponder::new().respond("How are you today?").unwrap();
        assert!(reply.starts_with("I'm doing great"));
    }

    #[test]
    fn test_goodbye() {
        let responder = EchoResponder::new();
        assert!(responder.respond("goodbye").unwrap().starts_with("Goodbye!"));
        assert!(responder.respond("ok bye").unwrap().starts_with("Goodbye!"));
    }

    #[test]
    fn test_help_and_weather() {
        let responder = EchoResponder::new();
        assert!(responder.respond("can you help me").unwrap().starts_with("I can help you"));
        assert!(
            responder
                .respond("what's the weather like")
                .unwrap()
                .starts_with("I don't have access to real-time weather data")
        );
    }

    #[test]
    fn test_time_uses_clock() {
        let responder = EchoResponder::with_clock(afternoon);
        assert_eq!(
            responder.respond("what time is it").unwrap(),
            "The current time is 3:04 PM."
        );
    }

    #[test]
    fn test_default_echo_is_lowercased() {
        let reply = EchoResponder::new().respond("Order a Pizza").unwrap();
        assert_eq!(
            reply,
            "I heard you say: order a pizza. Is there anything specific you'd like me to help you with?"
        );
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(Time::MIDNIGHT), "12:00 AM");
        assert_eq!(format_clock(Time::from_hms(12, 30, 0).unwrap()), "12:30 PM");
        assert_eq!(format_clock(Time::from_hms(9, 5, 0).unwrap()), "9:05 AM");
        assert_eq!(format_clock(Time::from_hms(23, 59, 0).unwrap()), "11:59 PM");
    }
}
