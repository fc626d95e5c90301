//! Mixed tokenizer for scoring text that interleaves alphabetic words and
//! CJK runs. ASCII-alphanumeric runs become lowercase word tokens; non-ASCII
//! runs contribute character bigrams (short runs pass through whole).

const CJK_NGRAM_SIZE: usize = 2;

pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut buffer = String::new();
    let mut ascii_run = true;

    let mut flush = |buffer: &mut String, ascii_run: bool, tokens: &mut Vec<String>| {
        if buffer.is_empty() {
            return;
        }
        if ascii_run {
            tokens.push(buffer.to_lowercase());
        } else {
            tokens.extend(char_ngrams(buffer, CJK_NGRAM_SIZE));
        }
        buffer.clear();
    };

    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            let ch_ascii = ch.is_ascii();
            if !buffer.is_empty() && ch_ascii != ascii_run {
                flush(&mut buffer, ascii_run, &mut tokens);
            }
            ascii_run = ch_ascii;
            buffer.push(ch);
        } else {
            flush(&mut buffer, ascii_run, &mut tokens);
        }
    }
    flush(&mut buffer, ascii_run, &mut tokens);

    tokens
}

fn char_ngrams(token: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = token.chars().collect();
    if chars.is_empty() || n == 0 {
        return Vec::new();
    }
    if chars.len() <= n {
        return vec![token.to_string()];
    }

    chars
        .windows(n)
        .map(|window| window.iter().collect::<String>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_words_are_lowercased() {
        assert_eq!(
            tokenize("Apple releases iPhone-16"),
            vec!["apple", "releases", "iphone", "16"]
        );
    }

    #[test]
    fn cjk_runs_become_bigrams() {
        assert_eq!(tokenize("人工智能"), vec!["人工", "工智", "智能"]);
    }

    #[test]
    fn short_cjk_runs_pass_through() {
        assert_eq!(tokenize("中国 launch"), vec!["中国", "launch"]);
    }

    #[test]
    fn mixed_script_splits_runs() {
        let tokens = tokenize("AI生态系统2024");
        assert!(tokens.contains(&"ai".to_string()));
        assert!(tokens.contains(&"生态".to_string()));
        assert!(tokens.contains(&"2024".to_string()));
    }
}
