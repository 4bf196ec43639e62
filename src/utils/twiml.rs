//! TwiML documents returned to Twilio's voice webhook.

/// Escape text for use in XML attribute values and element content
pub fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Build the response that connects an inbound call to the media stream.
///
/// Twilio plays the `<Say>` intro, then opens a Media Streams socket to
/// `stream_url` carrying `callSid` and `caller` as custom parameters.
pub fn voice_response(stream_url: &str, call_sid: &str, caller: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Say>Connecting you to the voice assistant.</Say>
    <Connect>
        <Stream url="{url}">
            <Parameter name="callSid" value="{call_sid}"/>
            <Parameter name="caller" value="{caller}"/>
        </Stream>
    </Connect>
</Response>"#,
        url = xml_escape(stream_url),
        call_sid = xml_escape(call_sid),
        caller = xml_escape(caller),
    )
}
