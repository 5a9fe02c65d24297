//! Tokenizer for the `{{ ... }}` expression grammar.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
  Int(i64),
  Float(f64),
  Str(String),
  Ident(String),
  Dollar(String), // $json, $input, $node, $env, $execution, $itemIndex
  True,
  False,
  Null,
  Dot,
  Comma,
  LParen,
  RParen,
  LBracket,
  RBracket,
  Question,
  Colon,
  Plus,
  Minus,
  Star,
  Slash,
  Percent,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  And,
  Or,
  Not,
  Eof,
}

#[derive(Debug, thiserror::Error)]
#[error("unexpected character '{0}' at position {1}")]
pub struct LexError(pub char, pub usize);

pub fn lex(src: &str) -> Result<Vec<Token>, LexError> {
  let chars: Vec<char> = src.chars().collect();
  let mut i = 0;
  let mut tokens = Vec::new();

  while i < chars.len() {
    let c = chars[i];
    if c.is_whitespace() {
      i += 1;
      continue;
    }
    match c {
      '.' => {
        tokens.push(Token::Dot);
        i += 1;
      }
      ',' => {
        tokens.push(Token::Comma);
        i += 1;
      }
      '(' => {
        tokens.push(Token::LParen);
        i += 1;
      }
      ')' => {
        tokens.push(Token::RParen);
        i += 1;
      }
      '[' => {
        tokens.push(Token::LBracket);
        i += 1;
      }
      ']' => {
        tokens.push(Token::RBracket);
        i += 1;
      }
      '?' => {
        tokens.push(Token::Question);
        i += 1;
      }
      ':' => {
        tokens.push(Token::Colon);
        i += 1;
      }
      '+' => {
        tokens.push(Token::Plus);
        i += 1;
      }
      '-' => {
        tokens.push(Token::Minus);
        i += 1;
      }
      '*' => {
        tokens.push(Token::Star);
        i += 1;
      }
      '/' => {
        tokens.push(Token::Slash);
        i += 1;
      }
      '%' => {
        tokens.push(Token::Percent);
        i += 1;
      }
      '=' => {
        if chars.get(i + 1) == Some(&'=') {
          tokens.push(Token::Eq);
          i += 2;
        } else {
          return Err(LexError(c, i));
        }
      }
      '!' => {
        if chars.get(i + 1) == Some(&'=') {
          tokens.push(Token::Ne);
          i += 2;
        } else {
          tokens.push(Token::Not);
          i += 1;
        }
      }
      '<' => {
        if chars.get(i + 1) == Some(&'=') {
          tokens.push(Token::Le);
          i += 2;
        } else {
          tokens.push(Token::Lt);
          i += 1;
        }
      }
      '>' => {
        if chars.get(i + 1) == Some(&'=') {
          tokens.push(Token::Ge);
          i += 2;
        } else {
          tokens.push(Token::Gt);
          i += 1;
        }
      }
      '&' => {
        if chars.get(i + 1) == Some(&'&') {
          tokens.push(Token::And);
          i += 2;
        } else {
          return Err(LexError(c, i));
        }
      }
      '|' => {
        if chars.get(i + 1) == Some(&'|') {
          tokens.push(Token::Or);
          i += 2;
        } else {
          return Err(LexError(c, i));
        }
      }
      '\'' | '"' => {
        let quote = c;
        let mut s = String::new();
        i += 1;
        while i < chars.len() && chars[i] != quote {
          if chars[i] == '\\' && i + 1 < chars.len() {
            i += 1;
            s.push(match chars[i] {
              'n' => '\n',
              't' => '\t',
              other => other,
            });
          } else {
            s.push(chars[i]);
          }
          i += 1;
        }
        i += 1; // closing quote
        tokens.push(Token::Str(s));
      }
      '$' => {
        let start = i;
        i += 1;
        while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
          i += 1;
        }
        tokens.push(Token::Dollar(chars[start..i].iter().collect()));
      }
      c if c.is_ascii_digit() => {
        let start = i;
        let mut is_float = false;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
          if chars[i] == '.' {
            is_float = true;
          }
          i += 1;
        }
        let text: String = chars[start..i].iter().collect();
        if is_float {
          tokens.push(Token::Float(text.parse().map_err(|_| LexError(c, start))?));
        } else {
          tokens.push(Token::Int(text.parse().map_err(|_| LexError(c, start))?));
        }
      }
      c if c.is_alphabetic() || c == '_' => {
        let start = i;
        while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
          i += 1;
        }
        let word: String = chars[start..i].iter().collect();
        tokens.push(match word.as_str() {
          "true" => Token::True,
          "false" => Token::False,
          "null" => Token::Null,
          "and" => Token::And,
          "or" => Token::Or,
          "not" => Token::Not,
          _ => Token::Ident(word),
        });
      }
      other => return Err(LexError(other, i)),
    }
  }

  tokens.push(Token::Eof);
  Ok(tokens)
}
