//! Shared vocabulary: spoken digit words, homophones, and NATO phonetic letters.
//!
//! Every grammar that deals with digits or letters builds on the tables here so that
//! "won", "niner", and "alpha" map to the same values no matter which grammar is active.

/// Maps a single spoken word to the digit it represents, including common homophones
/// ("to" -> 2, "for" -> 4, "ate" -> 8, "won" -> 1, "niner" -> 9) that STT engines
/// frequently produce for digit sequences.
pub fn word_to_digit(word: &str) -> Option<u8> {
    let w = word.to_ascii_lowercase();
    Some(match w.as_str() {
        "zero" | "oh" | "o" => 0,
        "one" | "won" => 1,
        "two" | "to" | "too" => 2,
        "three" => 3,
        "four" | "for" | "fore" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" | "ate" => 8,
        "nine" | "niner" => 9,
        _ => return None,
    })
}

/// Maps two-digit compound number words ("twelve", "thirty-four") to their two constituent
/// digits. Returns `None` if `word` isn't a recognised compound.
pub fn compound_word_to_digits(word: &str) -> Option<(u8, u8)> {
    let w = word.to_ascii_lowercase();
    let teens: &[(&str, (u8, u8))] = &[
        ("ten", (1, 0)),
        ("eleven", (1, 1)),
        ("twelve", (1, 2)),
        ("thirteen", (1, 3)),
        ("fourteen", (1, 4)),
        ("fifteen", (1, 5)),
        ("sixteen", (1, 6)),
        ("seventeen", (1, 7)),
        ("eighteen", (1, 8)),
        ("nineteen", (1, 9)),
    ];
    if let Some((_, pair)) = teens.iter().find(|(k, _)| *k == w) {
        return Some(*pair);
    }

    let tens: &[(&str, u8)] = &[
        ("twenty", 2),
        ("thirty", 3),
        ("forty", 4),
        ("fourty", 4),
        ("fifty", 5),
        ("sixty", 6),
        ("seventy", 7),
        ("eighty", 8),
        ("ninety", 9),
    ];

    // "thirty-four", "thirty four", or bare "thirty" (implicit zero ones digit)
    for (prefix, tens_digit) in tens {
        if w == *prefix {
            return Some((*tens_digit, 0));
        }
        if let Some(rest) = w.strip_prefix(prefix) {
            let rest = rest.trim_start_matches('-').trim();
            if rest.is_empty() {
                return Some((*tens_digit, 0));
            }
            if let Some(ones) = word_to_digit(rest) {
                if ones <= 9 {
                    return Some((*tens_digit, ones));
                }
            }
        }
    }
    None
}

/// NATO phonetic alphabet, plus common civilian aliases heard on noisy calls
/// ("able"/"adam"/"apple" -> A, "boy"/"ball" -> B, ...).
pub fn word_to_letter(word: &str) -> Option<char> {
    let w = word.to_ascii_lowercase();
    Some(match w.as_str() {
        "alpha" | "alfa" | "able" | "adam" | "apple" => 'A',
        "bravo" | "boy" | "ball" | "baker" => 'B',
        "charlie" | "cat" | "charles" => 'C',
        "delta" | "dog" | "david" => 'D',
        "echo" | "edward" | "easy" => 'E',
        "foxtrot" | "frank" | "fox" => 'F',
        "golf" | "george" => 'G',
        "hotel" | "henry" | "how" => 'H',
        "india" | "item" | "ida" => 'I',
        "juliett" | "juliet" | "john" | "jig" => 'J',
        "kilo" | "king" | "kate" => 'K',
        "lima" | "love" | "larry" => 'L',
        "mike" | "mary" | "monkey" => 'M',
        "november" | "nancy" | "nan" => 'N',
        "oscar" | "oboe" | "otto" => 'O',
        "papa" | "peter" | "paul" => 'P',
        "quebec" | "queen" => 'Q',
        "romeo" | "robert" | "roger" => 'R',
        "sierra" | "sugar" | "sam" => 'S',
        "tango" | "tare" | "tom" => 'T',
        "uniform" | "uncle" => 'U',
        "victor" | "vincent" => 'V',
        "whiskey" | "william" | "willie" => 'W',
        "xray" | "x-ray" => 'X',
        "yankee" | "young" | "yoke" => 'Y',
        "zulu" | "zebra" => 'Z',
        _ => return None,
    })
}
