// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! WhatsApp deep-links for contacting a seller.

const WHATSAPP_BASE_URL: &str = "https://wa.me";

/// Strip everything except ASCII digits (including a leading `+`).
pub fn digits_only(number: &str) -> String {
    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Build `https://wa.me/{digits}[?text=...]`, or `None` if the number has no digits.
pub fn whatsapp_link(number: &str, text: Option<&str>) -> Option<String> {
    let digits = digits_only(number);
    if digits.is_empty() {
        return None;
    }

    Some(match text {
        Some(text) if !text.is_empty() => format!(
            "{}/{}?text={}",
            WHATSAPP_BASE_URL,
            digits,
            urlencoding::encode(text)
        ),
        _ => format!("{}/{}", WHATSAPP_BASE_URL, digits),
    })
}

/// Pre-filled message a buyer sends about a listing.
pub fn listing_inquiry_text(title: &str) -> String {
    format!("Olá! Estou interessado no anúncio: \"{}\".", title)
}
