//! Canonical Bible book numbering.
//!
//! Door43 follows the USFM book ordinals, where the New Testament starts at
//! 41 (40 is reserved). Output filenames are prefixed with these codes so a
//! book sorts into canon order regardless of its position in the manifest.

/// Two-digit ordinal for a known lowercase book identifier.
pub fn book_number(identifier: &str) -> Option<&'static str> {
    let number = match identifier {
        "gen" => "01",
        "exo" => "02",
        "lev" => "03",
        "num" => "04",
        "deu" => "05",
        "jos" => "06",
        "jdg" => "07",
        "rut" => "08",
        "1sa" => "09",
        "2sa" => "10",
        "1ki" => "11",
        "2ki" => "12",
        "1ch" => "13",
        "2ch" => "14",
        "ezr" => "15",
        "neh" => "16",
        "est" => "17",
        "job" => "18",
        "psa" => "19",
        "pro" => "20",
        "ecc" => "21",
        "sng" => "22",
        "isa" => "23",
        "jer" => "24",
        "lam" => "25",
        "ezk" => "26",
        "dan" => "27",
        "hos" => "28",
        "jol" => "29",
        "amo" => "30",
        "oba" => "31",
        "jon" => "32",
        "mic" => "33",
        "nam" => "34",
        "hab" => "35",
        "zep" => "36",
        "hag" => "37",
        "zec" => "38",
        "mal" => "39",
        "mat" => "41",
        "mrk" => "42",
        "luk" => "43",
        "jhn" => "44",
        "act" => "45",
        "rom" => "46",
        "1co" => "47",
        "2co" => "48",
        "gal" => "49",
        "eph" => "50",
        "php" => "51",
        "col" => "52",
        "1th" => "53",
        "2th" => "54",
        "1ti" => "55",
        "2ti" => "56",
        "tit" => "57",
        "phm" => "58",
        "heb" => "59",
        "jas" => "60",
        "1pe" => "61",
        "2pe" => "62",
        "1jn" => "63",
        "2jn" => "64",
        "3jn" => "65",
        "jud" => "66",
        "rev" => "67",
        _ => return None,
    };
    Some(number)
}

/// Whether the identifier names a known Bible book.
pub fn is_book(identifier: &str) -> bool {
    book_number(identifier).is_some()
}
