// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Official category catalogue.

/// Categories offered on the home page, the listing form and the feed filter.
pub const CATEGORIES: [&str; 11] = [
    "Veículos",
    "Aluguer de Carros",
    "Imóveis",
    "Quartos & Arrendamento",
    "Moda & Beleza",
    "Serviços",
    "Guest House & Turismo",
    "Tecnologia",
    "Casa & Mobiliário",
    "Outros",
    "Procuro",
];
